//! Supervisor control loop
//!
//! A single loop owns the current worker and the failure window. It suspends
//! only in the inter-check sleep and the post-start grace wait, both of which
//! race the shutdown token.

use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::failure::FailureCounter;
use super::probe::{HealthCheck, HttpHealthProbe, ProbeResult};
use super::process::{CommandLauncher, OutputLog, StopOutcome, SupervisedWorker, WorkerLauncher};
use super::types::{RestartPolicy, RestartReason, SupervisorEvent, SupervisorState, SupervisorStats};
use crate::config::GuardianConfig;
use crate::coordination::ShutdownToken;
use crate::error::{GuardianError, Result};

/// What the loop should wait for after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    /// Sleep the normal check interval
    Continue,
    /// A worker was just launched; sleep the grace period
    Launched,
}

/// Keeps one worker process alive
pub struct Supervisor {
    policy: RestartPolicy,
    launcher: Box<dyn WorkerLauncher>,
    probe: Box<dyn HealthCheck>,
    worker: Option<Box<dyn SupervisedWorker>>,
    generation: u64,
    counter: FailureCounter,
    stats: SupervisorStats,
    state_tx: watch::Sender<SupervisorState>,
    event_tx: broadcast::Sender<SupervisorEvent>,
}

impl Supervisor {
    pub fn new(
        policy: RestartPolicy,
        launcher: impl WorkerLauncher + 'static,
        probe: impl HealthCheck + 'static,
    ) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Starting);
        let (event_tx, _) = broadcast::channel(64);
        let counter = FailureCounter::from_policy(&policy, Instant::now());

        Self {
            policy,
            launcher: Box::new(launcher),
            probe: Box::new(probe),
            worker: None,
            generation: 0,
            counter,
            stats: SupervisorStats::default(),
            state_tx,
            event_tx,
        }
    }

    /// Build a supervisor for the configured command and health endpoint
    pub fn from_config(config: &GuardianConfig) -> Result<Self> {
        let launcher = CommandLauncher::new(
            config.launch_spec(),
            OutputLog::new(config.worker.output_log.clone()),
        );
        let probe = HttpHealthProbe::from_config(&config.health)?;
        Ok(Self::new(config.restart_policy(), launcher, probe))
    }

    /// Watch state transitions
    pub fn state_receiver(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to supervisor events
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: SupervisorEvent) {
        let _ = self.event_tx.send(event);
    }

    fn set_state(&self, state: SupervisorState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Supervisor state: {} -> {}", previous, state);
        }
    }

    /// Run until `shutdown` fires, then stop the worker and return the run's counters
    pub async fn run(mut self, mut shutdown: ShutdownToken) -> SupervisorStats {
        info!(
            "Guardian started: checking every {:?}, restart after {} failures{}",
            self.policy.check_interval,
            self.policy.failure_threshold,
            self.policy
                .stale_data_threshold
                .map(|d| format!(" or {:?} without a reported success", d))
                .unwrap_or_default()
        );

        self.set_state(SupervisorState::Starting);
        let first = self.launch().await;
        let mut wait = self.next_wait(first);

        loop {
            let signal = tokio::select! {
                biased;
                signal = shutdown.requested() => Some(signal),
                _ = tokio::time::sleep(wait) => None,
            };
            if let Some(signal) = signal {
                info!("Guardian received {} signal", signal);
                break;
            }

            let outcome = self.tick().await;
            wait = self.next_wait(outcome);
        }

        self.shutdown().await;
        self.stats
    }

    fn next_wait(&mut self, outcome: Result<Tick>) -> Duration {
        match outcome {
            Ok(Tick::Continue) => self.policy.check_interval,
            Ok(Tick::Launched) => self.policy.post_restart_grace_period,
            Err(e) => {
                self.stats.unexpected_errors += 1;
                if e.is_worker_scoped() {
                    warn!("Supervision tick failed: {}", e);
                } else {
                    error!("Unexpected error in supervision loop: {}", e);
                }
                self.policy.error_backoff
            }
        }
    }

    /// One supervision step
    async fn tick(&mut self) -> Result<Tick> {
        let alive = match self.worker.as_mut() {
            Some(worker) => worker.is_alive(),
            None => {
                info!("No worker running, retrying launch");
                return self.launch().await;
            }
        };
        if !alive {
            return self.handle_exit().await;
        }

        let result = self.probe_once().await;

        // A dead process outranks whatever the probe said
        if !self.worker.as_mut().map(|w| w.is_alive()).unwrap_or(false) {
            debug!("Discarding probe result ({}) from an exited worker", result.status);
            return self.handle_exit().await;
        }

        let now = Instant::now();
        self.counter.record(&result, now);
        self.stats.probes += 1;

        let failures = self.counter.consecutive_failures();
        if result.status.is_failure() {
            self.stats.probe_failures += 1;
            warn!(
                "Health check failed: {} ({}/{} consecutive)",
                result.status, failures, self.policy.failure_threshold
            );
        } else {
            info!("Health check OK: {}", result.status);
        }
        self.emit(SupervisorEvent::Probed {
            result,
            consecutive_failures: failures,
        });

        if let Some(reason) = self.counter.escalation(now) {
            return self.restart(reason).await;
        }

        self.set_state(if failures > 0 {
            SupervisorState::Degraded
        } else {
            SupervisorState::Running
        });
        Ok(Tick::Continue)
    }

    /// Probe bounded by the policy timeout, whatever the probe itself does
    async fn probe_once(&mut self) -> ProbeResult {
        let limit = self.policy.probe_timeout;
        match tokio::time::timeout(limit, self.probe.check()).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Health probe exceeded {:?}", limit);
                ProbeResult::unreachable()
            }
        }
    }

    async fn handle_exit(&mut self) -> Result<Tick> {
        error!("Worker process died unexpectedly (generation {})", self.generation);
        self.emit(SupervisorEvent::ProcessExited {
            generation: self.generation,
        });
        self.restart(RestartReason::ProcessExited).await
    }

    async fn restart(&mut self, reason: RestartReason) -> Result<Tick> {
        self.set_state(SupervisorState::Restarting);
        error!("Restarting worker: {}", reason);
        self.stats.restarts += 1;
        self.emit(SupervisorEvent::RestartIssued { reason });
        self.launch().await
    }

    /// Stop the current worker (if any), then start a new generation.
    ///
    /// Spawn failures are absorbed and retried on the next tick; a worker that
    /// cannot be confirmed dead aborts the launch so two never run at once.
    async fn launch(&mut self) -> Result<Tick> {
        self.retire_current().await?;

        match self.launcher.launch() {
            Ok(worker) => {
                self.generation += 1;
                self.stats.launches += 1;
                let pid = worker.pid();
                self.worker = Some(worker);
                self.counter.reset(Instant::now());

                info!(
                    "Worker generation {} running (pid {:?}), first health check in {:?}",
                    self.generation, pid, self.policy.post_restart_grace_period
                );
                self.emit(SupervisorEvent::Started {
                    generation: self.generation,
                    pid,
                });
                Ok(Tick::Launched)
            }
            Err(e) => {
                self.stats.spawn_failures += 1;
                error!(
                    "Failed to start worker: {} (retrying in {:?})",
                    e, self.policy.check_interval
                );
                self.emit(SupervisorEvent::SpawnFailed {
                    error: e.to_string(),
                });
                Ok(Tick::Continue)
            }
        }
    }

    async fn retire_current(&mut self) -> Result<()> {
        let Some(mut worker) = self.worker.take() else {
            return Ok(());
        };
        let pid = worker.pid();

        match worker.stop(self.policy.stop_timeout).await {
            Ok(StopOutcome::Killed) => {
                self.emit(SupervisorEvent::StopEscalated { pid });
            }
            Ok(StopOutcome::Graceful) => info!("Worker (pid {:?}) stopped", pid),
            Ok(StopOutcome::AlreadyExited) => debug!("Worker (pid {:?}) already exited", pid),
            Err(e) => {
                warn!("Stopping worker (pid {:?}) failed: {}, forcing kill", pid, e);
                if let Err(e) = worker.kill().await {
                    self.worker = Some(worker);
                    return Err(e);
                }
                self.emit(SupervisorEvent::StopEscalated { pid });
            }
        }

        if worker.is_alive() {
            self.worker = Some(worker);
            return Err(GuardianError::Internal(format!(
                "worker (pid {:?}) still alive after stop",
                pid
            )));
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.set_state(SupervisorState::ShuttingDown);
        info!("Guardian shutting down, stopping worker");

        if let Err(e) = self.retire_current().await {
            error!("Worker did not stop cleanly during shutdown: {}", e);
        }

        self.emit(SupervisorEvent::ShutdownCompleted);
        info!(
            "Guardian stopped after {} launches and {} restarts",
            self.stats.launches, self.stats.restarts
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::{shutdown_channel, ShutdownSignal};
    use crate::supervisor::probe::HealthStatus;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum StopBehaviour {
        Graceful,
        NeedsKill,
        Stuck,
    }

    #[derive(Default)]
    struct World {
        workers: Vec<Arc<AtomicBool>>,
        max_live: usize,
        failing_spawns: u32,
    }

    impl World {
        fn live(&self) -> usize {
            self.workers.iter().filter(|w| w.load(Ordering::SeqCst)).count()
        }

        fn kill_current(&self) {
            if let Some(worker) = self.workers.last() {
                worker.store(false, Ordering::SeqCst);
            }
        }
    }

    struct FakeWorker {
        pid: u32,
        alive: Arc<AtomicBool>,
        stop: StopBehaviour,
    }

    #[async_trait]
    impl SupervisedWorker for FakeWorker {
        fn pid(&self) -> Option<u32> {
            Some(self.pid)
        }

        fn is_alive(&mut self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn stop(&mut self, timeout: Duration) -> Result<StopOutcome> {
            if !self.alive.load(Ordering::SeqCst) {
                return Ok(StopOutcome::AlreadyExited);
            }
            match self.stop {
                StopBehaviour::Graceful => {
                    self.alive.store(false, Ordering::SeqCst);
                    Ok(StopOutcome::Graceful)
                }
                StopBehaviour::NeedsKill => {
                    self.alive.store(false, Ordering::SeqCst);
                    Ok(StopOutcome::Killed)
                }
                StopBehaviour::Stuck => Err(GuardianError::StopTimeout {
                    pid: self.pid,
                    timeout,
                }),
            }
        }

        async fn kill(&mut self) -> Result<()> {
            match self.stop {
                StopBehaviour::Stuck => Err(GuardianError::Signal {
                    pid: self.pid,
                    reason: "operation not permitted".to_string(),
                }),
                _ => {
                    self.alive.store(false, Ordering::SeqCst);
                    Ok(())
                }
            }
        }
    }

    struct FakeLauncher {
        world: Arc<Mutex<World>>,
        stop: StopBehaviour,
    }

    impl WorkerLauncher for FakeLauncher {
        fn launch(&self) -> Result<Box<dyn SupervisedWorker>> {
            let mut world = self.world.lock().unwrap();
            if world.failing_spawns > 0 {
                world.failing_spawns -= 1;
                return Err(GuardianError::SpawnFailed {
                    command: "fake-worker".to_string(),
                    reason: "No such file or directory".to_string(),
                });
            }

            let alive = Arc::new(AtomicBool::new(true));
            world.workers.push(alive.clone());
            world.max_live = world.max_live.max(world.live());

            Ok(Box::new(FakeWorker {
                pid: 1000 + world.workers.len() as u32,
                alive,
                stop: self.stop,
            }))
        }
    }

    struct FakeProbe {
        script: Mutex<VecDeque<ProbeResult>>,
        fallback: ProbeResult,
        calls: AtomicU32,
        world: Arc<Mutex<World>>,
        /// Kill the current worker while answering this call (1-based)
        kill_on_call: Option<u32>,
    }

    #[async_trait]
    impl HealthCheck for FakeProbe {
        async fn check(&self) -> ProbeResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.kill_on_call == Some(call) {
                self.world.lock().unwrap().kill_current();
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(self.fallback)
        }
    }

    struct Harness {
        world: Arc<Mutex<World>>,
        supervisor: Supervisor,
    }

    fn policy() -> RestartPolicy {
        RestartPolicy {
            check_interval: Duration::from_secs(60),
            failure_threshold: 3,
            post_restart_grace_period: Duration::from_secs(30),
            stale_data_threshold: None,
            probe_timeout: Duration::from_secs(10),
            stop_timeout: Duration::from_secs(10),
            error_backoff: Duration::from_secs(10),
        }
    }

    fn harness(
        policy: RestartPolicy,
        script: Vec<ProbeResult>,
        fallback: ProbeResult,
        stop: StopBehaviour,
        kill_on_call: Option<u32>,
    ) -> Harness {
        let world = Arc::new(Mutex::new(World::default()));
        let launcher = FakeLauncher {
            world: world.clone(),
            stop,
        };
        let probe = FakeProbe {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicU32::new(0),
            world: world.clone(),
            kill_on_call,
        };
        Harness {
            world,
            supervisor: Supervisor::new(policy, launcher, probe),
        }
    }

    fn healthy() -> ProbeResult {
        ProbeResult::reported(HealthStatus::Healthy)
    }

    async fn next_event(rx: &mut broadcast::Receiver<SupervisorEvent>) -> SupervisorEvent {
        tokio::time::timeout(Duration::from_secs(86_400), rx.recv())
            .await
            .expect("supervisor went quiet")
            .expect("event channel closed")
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_threshold_failures() {
        let h = harness(policy(), vec![], ProbeResult::unreachable(), StopBehaviour::Graceful, None);
        let mut rx = h.supervisor.subscribe();
        let (handle, token) = shutdown_channel();
        let task = tokio::spawn(h.supervisor.run(token));

        assert!(matches!(next_event(&mut rx).await, SupervisorEvent::Started { generation: 1, .. }));
        for expected in 1..=3 {
            match next_event(&mut rx).await {
                SupervisorEvent::Probed {
                    result,
                    consecutive_failures,
                } => {
                    assert_eq!(result.status, HealthStatus::Unreachable);
                    assert_eq!(consecutive_failures, expected);
                }
                other => panic!("expected probe #{expected}, got {other:?}"),
            }
        }
        match next_event(&mut rx).await {
            SupervisorEvent::RestartIssued { reason } => {
                assert_eq!(reason, RestartReason::FailureThreshold { failures: 3 })
            }
            other => panic!("expected restart, got {other:?}"),
        }
        assert!(matches!(next_event(&mut rx).await, SupervisorEvent::Started { generation: 2, .. }));

        // Counter starts over for the new generation
        match next_event(&mut rx).await {
            SupervisorEvent::Probed {
                consecutive_failures,
                ..
            } => assert_eq!(consecutive_failures, 1),
            other => panic!("expected probe, got {other:?}"),
        }

        handle.request(ShutdownSignal::Requested);
        let stats = task.await.unwrap();
        assert_eq!(stats.restarts, 1);
        assert_eq!(stats.launches, 2);
        assert_eq!(h.world.lock().unwrap().live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_worker_is_never_restarted() {
        let mut policy = policy();
        policy.stale_data_threshold = Some(Duration::from_secs(600));
        let idle = ProbeResult::reported(HealthStatus::Idle);
        let h = harness(policy, vec![], idle, StopBehaviour::Graceful, None);
        let mut rx = h.supervisor.subscribe();
        let (handle, token) = shutdown_channel();
        let task = tokio::spawn(h.supervisor.run(token));

        let mut probes = 0;
        while probes < 30 {
            match next_event(&mut rx).await {
                SupervisorEvent::Probed {
                    result,
                    consecutive_failures,
                } => {
                    assert_eq!(result.status, HealthStatus::Idle);
                    assert_eq!(consecutive_failures, 0);
                    probes += 1;
                }
                SupervisorEvent::Started { generation: 1, .. } => {}
                other => panic!("unexpected event {other:?}"),
            }
        }

        handle.request(ShutdownSignal::Requested);
        let stats = task.await.unwrap();
        assert_eq!(stats.restarts, 0);
        assert_eq!(stats.launches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_process_restarts_without_waiting_for_threshold() {
        let h = harness(
            policy(),
            vec![ProbeResult::unreachable()],
            healthy(),
            StopBehaviour::Graceful,
            None,
        );
        let world = h.world.clone();
        let mut rx = h.supervisor.subscribe();
        let (handle, token) = shutdown_channel();
        let task = tokio::spawn(h.supervisor.run(token));

        assert!(matches!(next_event(&mut rx).await, SupervisorEvent::Started { .. }));
        assert!(matches!(
            next_event(&mut rx).await,
            SupervisorEvent::Probed {
                consecutive_failures: 1,
                ..
            }
        ));

        world.lock().unwrap().kill_current();

        assert!(matches!(
            next_event(&mut rx).await,
            SupervisorEvent::ProcessExited { generation: 1 }
        ));
        match next_event(&mut rx).await {
            SupervisorEvent::RestartIssued { reason } => assert_eq!(reason, RestartReason::ProcessExited),
            other => panic!("expected restart, got {other:?}"),
        }
        assert!(matches!(next_event(&mut rx).await, SupervisorEvent::Started { generation: 2, .. }));

        handle.request(ShutdownSignal::Requested);
        let stats = task.await.unwrap();
        assert_eq!(stats.probes, 1, "no probe should run against the dead worker");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_during_probe_discards_the_result() {
        let h = harness(policy(), vec![], healthy(), StopBehaviour::Graceful, Some(1));
        let mut rx = h.supervisor.subscribe();
        let (handle, token) = shutdown_channel();
        let task = tokio::spawn(h.supervisor.run(token));

        assert!(matches!(next_event(&mut rx).await, SupervisorEvent::Started { .. }));
        assert!(matches!(next_event(&mut rx).await, SupervisorEvent::ProcessExited { .. }));
        assert!(matches!(
            next_event(&mut rx).await,
            SupervisorEvent::RestartIssued {
                reason: RestartReason::ProcessExited
            }
        ));

        handle.request(ShutdownSignal::Requested);
        let stats = task.await.unwrap();
        assert_eq!(stats.probes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_success_triggers_restart() {
        let mut policy = policy();
        policy.stale_data_threshold = Some(Duration::from_secs(600));
        let h = harness(
            policy,
            vec![],
            ProbeResult::assumed_healthy(),
            StopBehaviour::Graceful,
            None,
        );
        let mut rx = h.supervisor.subscribe();
        let (handle, token) = shutdown_channel();
        let task = tokio::spawn(h.supervisor.run(token));

        assert!(matches!(next_event(&mut rx).await, SupervisorEvent::Started { .. }));
        let started = Instant::now();

        let reason = loop {
            match next_event(&mut rx).await {
                SupervisorEvent::Probed {
                    result,
                    consecutive_failures,
                } => {
                    assert_eq!(result.status, HealthStatus::Healthy);
                    assert_eq!(consecutive_failures, 0);
                }
                SupervisorEvent::RestartIssued { reason } => break reason,
                other => panic!("unexpected event {other:?}"),
            }
        };

        assert!(matches!(reason, RestartReason::StaleData { since_success } if since_success >= Duration::from_secs(600)));
        assert!(started.elapsed() >= Duration::from_secs(600));

        handle.request(ShutdownSignal::Requested);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_failure_is_retried_on_interval() {
        let h = harness(policy(), vec![], healthy(), StopBehaviour::Graceful, None);
        h.world.lock().unwrap().failing_spawns = 2;
        let mut rx = h.supervisor.subscribe();
        let (handle, token) = shutdown_channel();
        let task = tokio::spawn(h.supervisor.run(token));

        assert!(matches!(next_event(&mut rx).await, SupervisorEvent::SpawnFailed { .. }));
        let first_failure = Instant::now();
        assert!(matches!(next_event(&mut rx).await, SupervisorEvent::SpawnFailed { .. }));
        let retry_after = first_failure.elapsed();
        assert!(retry_after >= Duration::from_secs(60) && retry_after < Duration::from_secs(61));
        assert!(matches!(next_event(&mut rx).await, SupervisorEvent::Started { generation: 1, .. }));

        handle.request(ShutdownSignal::Requested);
        let stats = task.await.unwrap();
        assert_eq!(stats.spawn_failures, 2);
        assert_eq!(stats.launches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_one_live_worker_across_restarts() {
        let mut policy = policy();
        policy.failure_threshold = 1;
        let h = harness(policy, vec![], ProbeResult::unreachable(), StopBehaviour::NeedsKill, None);
        let mut rx = h.supervisor.subscribe();
        let (handle, token) = shutdown_channel();
        let task = tokio::spawn(h.supervisor.run(token));

        let mut escalations = 0;
        loop {
            match next_event(&mut rx).await {
                SupervisorEvent::StopEscalated { .. } => escalations += 1,
                SupervisorEvent::Started { generation: 5, .. } => break,
                _ => {}
            }
        }

        handle.request(ShutdownSignal::Requested);
        task.await.unwrap();

        let world = h.world.lock().unwrap();
        assert_eq!(escalations, 4);
        assert_eq!(world.max_live, 1);
        assert_eq!(world.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unkillable_worker_blocks_second_launch() {
        let mut policy = policy();
        policy.failure_threshold = 1;
        let h = harness(policy, vec![], ProbeResult::unreachable(), StopBehaviour::Stuck, None);
        let world = h.world.clone();
        let mut state = h.supervisor.state_receiver();
        let mut rx = h.supervisor.subscribe();
        let (handle, token) = shutdown_channel();
        let task = tokio::spawn(h.supervisor.run(token));

        let mut restarts = 0;
        while restarts < 3 {
            match next_event(&mut rx).await {
                SupervisorEvent::RestartIssued { .. } => restarts += 1,
                SupervisorEvent::Started { generation, .. } => assert_eq!(generation, 1),
                _ => {}
            }
        }
        assert_eq!(*state.borrow_and_update(), SupervisorState::Restarting);

        handle.request(ShutdownSignal::Requested);
        let stats = task.await.unwrap();
        assert_eq!(stats.launches, 1);
        assert!(stats.unexpected_errors >= 3);
        assert_eq!(world.lock().unwrap().max_live, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_grace_wait_and_stops_worker() {
        let h = harness(policy(), vec![], healthy(), StopBehaviour::Graceful, None);
        let state = h.supervisor.state_receiver();
        let mut rx = h.supervisor.subscribe();
        let (handle, token) = shutdown_channel();
        let task = tokio::spawn(h.supervisor.run(token));

        assert!(matches!(next_event(&mut rx).await, SupervisorEvent::Started { .. }));
        let requested_at = Instant::now();
        handle.request(ShutdownSignal::Interrupt);

        let stats = task.await.unwrap();
        assert!(requested_at.elapsed() < Duration::from_secs(30));
        assert!(matches!(next_event(&mut rx).await, SupervisorEvent::ShutdownCompleted));
        assert_eq!(*state.borrow(), SupervisorState::ShuttingDown);
        assert_eq!(stats.probes, 0);
        assert_eq!(h.world.lock().unwrap().live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_then_running() {
        let h = harness(
            policy(),
            vec![ProbeResult::unreachable()],
            healthy(),
            StopBehaviour::Graceful,
            None,
        );
        let state = h.supervisor.state_receiver();
        let mut rx = h.supervisor.subscribe();
        let (handle, token) = shutdown_channel();
        let task = tokio::spawn(h.supervisor.run(token));

        assert!(matches!(next_event(&mut rx).await, SupervisorEvent::Started { .. }));
        assert_eq!(*state.borrow(), SupervisorState::Starting);

        next_event(&mut rx).await;
        assert_eq!(*state.borrow(), SupervisorState::Degraded);

        next_event(&mut rx).await;
        assert_eq!(*state.borrow(), SupervisorState::Running);

        handle.request(ShutdownSignal::Requested);
        task.await.unwrap();
    }
}
