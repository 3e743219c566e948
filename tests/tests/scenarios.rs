use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use surge::prelude::*;
use surge_tests::{assert_step_invariants, init, three_steps};

#[tokio::test]
#[ntest::timeout(10_000)]
async fn always_succeeding_ramp_is_healthy() {
    init();

    let tester = LoadTester::new(three_steps("scenario_a"), || async {
        Ok::<_, Failure>(())
    })
    .unwrap();
    let report = tester.run().await;

    assert!(!report.detected());
    assert_eq!(report.steps_completed(), 3);
    assert_eq!(report.max_healthy_load(), 15);
    assert_eq!(report.total_successful(), 30);
    assert_eq!(report.total_failed(), 0);
    assert_eq!(report.breakpoint_step(), None);
    assert_eq!(report.failure_type(), None);
    assert!(report.steps().iter().all(LoadStepResult::is_healthy));
    assert_step_invariants(&report, 10);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn server_errors_break_after_consecutive_steps() {
    init();

    let tester = LoadTester::new(three_steps("scenario_b"), || async {
        Err::<(), _>(Failure::from_message(
            "503 Server Error: Service Unavailable for url: http://focus/alerts",
        ))
    })
    .unwrap();
    let report = tester.run().await;

    assert!(report.detected());
    assert_eq!(report.failure_type(), Some(FailureKind::ServerError));
    assert_eq!(report.breakpoint_step(), Some(2));
    assert_eq!(report.consecutive_failures(), 2);
    assert_eq!(report.steps_completed(), 2);
    assert_eq!(report.max_healthy_load(), 0);
    assert_step_invariants(&report, 10);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn unauthorized_breaks_on_first_step() {
    init();

    let calls = Arc::new(AtomicUsize::new(0));
    let func = {
        let calls = calls.clone();
        move || {
            let first = calls.fetch_add(1, Ordering::SeqCst) == 0;
            async move {
                if first {
                    Err(Failure::from_message("401 Client Error: Unauthorized"))
                } else {
                    Ok(())
                }
            }
        }
    };

    // A long consecutive-failure window shows the rule does not wait for it.
    let config = three_steps("scenario_c").max_consecutive_failures(5);
    let report = LoadTester::new(config, func).unwrap().run().await;

    assert!(report.detected());
    assert_eq!(report.breakpoint_step(), Some(1));
    assert_eq!(report.failure_type(), Some(FailureKind::Unauthorized));
    assert_eq!(report.steps().len(), 1);
    assert!(report.message().contains("unauthorized"));
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn circuit_breaker_stops_dispatching() {
    init();

    let calls = Arc::new(AtomicUsize::new(0));
    let func = {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(std::io::Error::from(std::io::ErrorKind::ConnectionRefused)) }
        }
    };

    let config = three_steps("scenario_d").requests_per_step(50);
    let report = LoadTester::new(config, func).unwrap().run().await;

    // Step 1 sends two batches of five, step 2 a single batch of ten.
    assert_eq!(calls.load(Ordering::SeqCst), 20);

    let steps = report.steps();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].short_circuited(), 40);
    assert_eq!(steps[1].short_circuited(), 40);
    for step in steps {
        assert_eq!(step.requests_sent(), 50);
        assert_eq!(step.failure_count(FailureKind::ConnectionError), 50);
    }

    assert!(report.detected());
    assert_eq!(report.failure_type(), Some(FailureKind::ConnectionError));
    assert_step_invariants(&report, 50);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn intermittent_failures_stay_healthy() {
    init();

    let calls = Arc::new(AtomicUsize::new(0));
    let func = {
        let calls = calls.clone();
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n % 20 == 0 {
                    Err(Failure::new(FailureKind::Timeout, "read timed out"))
                } else {
                    Ok(())
                }
            }
        }
    };

    let config = three_steps("intermittent").requests_per_step(20);
    let report = LoadTester::new(config, func).unwrap().run().await;

    assert!(!report.detected());
    assert_eq!(report.max_healthy_load(), 15);
    assert_eq!(report.total_failed(), 3);
    assert_step_invariants(&report, 20);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn stop_before_run_starts_no_step() {
    init();

    let calls = Arc::new(AtomicUsize::new(0));
    let func = {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Failure>(()) }
        }
    };

    let tester = LoadTester::new(three_steps("stopped"), func).unwrap();
    tester.stop();
    let report = tester.run().await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.steps_completed(), 0);
    assert!(report.steps().is_empty());
    assert!(!report.detected());
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn stop_during_cooldown_ends_run() {
    init();

    let config = three_steps("cooldown_stop").step_cooldown(Duration::from_secs(30));
    let tester = Arc::new(LoadTester::new(config, || async { Ok::<_, Failure>(()) }).unwrap());

    let handle = tester.stop_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.stop();
    });

    let start = Instant::now();
    let report = tester.run().await;

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(report.steps_completed(), 1);
    assert!(!report.detected());
    assert!(report.message().starts_with("Stopped"));
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn stop_mid_step_interrupts_it() {
    init();

    let stop = Arc::new(std::sync::OnceLock::<StopHandle>::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let func = {
        let stop = stop.clone();
        let calls = calls.clone();
        move || {
            if calls.fetch_add(1, Ordering::SeqCst) == 6 {
                if let Some(handle) = stop.get() {
                    handle.stop();
                }
            }
            async { Ok::<_, Failure>(()) }
        }
    };

    let config = three_steps("mid_step").requests_per_step(20);
    let tester = LoadTester::new(config, func).unwrap();
    let _ = stop.set(tester.stop_handle());
    let report = tester.run().await;

    // The second batch was already dispatched when the stop arrived.
    assert_eq!(calls.load(Ordering::SeqCst), 10);
    assert_eq!(report.steps().len(), 1);
    assert!(report.steps()[0].interrupted());
    assert_eq!(report.steps()[0].requests_sent(), 10);
    assert_eq!(report.steps_completed(), 0);
    assert_step_invariants(&report, 20);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn stop_from_another_thread() {
    init();

    let config = three_steps("thread_stop")
        .max_concurrency(1_000)
        .step_cooldown(Duration::from_millis(10));
    let tester = LoadTester::new(config, || async {
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok::<_, Failure>(())
    })
    .unwrap();

    let handle = tester.stop_handle();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        handle.stop();
    });

    let report = tester.run().await;
    stopper.join().unwrap();

    assert!(report.steps_completed() < 200);
    assert!(!report.detected());
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn records_metrics() {
    let handle = init();

    let tester = LoadTester::new(three_steps("metrics_run"), || async {
        Ok::<_, Failure>(())
    })
    .unwrap();
    tester.run().await;

    let rendered = handle.render();
    assert!(rendered.contains("surge_requests_success"));
    assert!(rendered.contains("metrics_run"));
}
