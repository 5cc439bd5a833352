use emberd::config::LogConfig;
use emberd::logging;

// The global subscriber can be installed once per process, so both modes are
// exercised in a single test.
#[test]
fn test_init_installs_once() {
    let buffered = LogConfig {
        non_blocking: true,
        ansi: false,
        ..LogConfig::default()
    };
    let guard = logging::init(&buffered);
    assert!(guard.is_some());

    assert!(logging::init(&buffered).is_none());

    let direct = LogConfig {
        non_blocking: false,
        ..buffered.clone()
    };
    assert!(logging::init(&direct).is_none());

    tracing::info!("still logging after repeated init");
    drop(guard);
}
