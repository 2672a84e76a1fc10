mod common;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use abridge::{AbridgeError, Config, RemoteGenerator, RemoteOutput};
use rust_decimal::Decimal;
use tempfile::NamedTempFile;

use common::ScriptedGenerator;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn load_explicit_file() {
    let file = write_config(
        r#"
        [rate_limit]
        requests = 5
        window_secs = 1

        [budget]
        daily_limit_usd = "0.50"
        "#,
    );

    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.rate_limit.requests, 5);
    assert_eq!(config.budget.daily_limit_usd, Decimal::new(50, 2));
    assert_eq!(config.concurrency.max_in_flight, 3);
}

#[test]
fn invalid_toml_is_configuration_error() {
    let file = write_config("[rate_limit\nrequests = ");
    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, AbridgeError::Configuration(ref m) if m.contains("parse")));
}

#[test]
fn invalid_values_fail_on_load() {
    let file = write_config("[concurrency]\nmax_in_flight = 0\n");
    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("max_in_flight"));
}

#[test]
fn unknown_sections_rejected_on_load() {
    let file = write_config("[server]\naddress = \"127.0.0.1:9741\"\n");
    assert!(Config::load(Some(file.path())).is_err());
}

#[tokio::test]
async fn client_builder_applies_configured_components() {
    let file = write_config(
        r#"
        [concurrency]
        max_in_flight = 7

        [cache]
        max_size_mb = 2

        [retry]
        max_retries = 1
        jitter = false

        [timeouts]
        summary_secs = 12
        "#,
    );
    let config = Config::load(Some(file.path())).unwrap();
    let generator = Arc::new(ScriptedGenerator::always(RemoteOutput::new("• ok", 1, 1)));

    let client = config
        .client_builder()
        .shared_generator(generator.clone())
        .build()
        .unwrap();

    assert_eq!(client.gate().capacity(), 7);
    assert_eq!(client.cache().capacity_bytes(), 2 * 1024 * 1024);
    assert_eq!(client.retry_config().max_attempts(), 2);
    assert_eq!(client.settings().summary_timeout, Duration::from_secs(12));

    client.summarize("configured").await.unwrap();
    assert_eq!(generator.calls()[0].params.timeout, Duration::from_secs(12));
}

#[tokio::test]
async fn mock_mode_serves_canned_output_without_api_key() {
    let file = write_config("[gemini]\nmock = true\n");
    let config = Config::load(Some(file.path())).unwrap();
    assert!(config.gemini.mock);

    let generator = config.remote_generator().unwrap();
    assert_eq!(generator.name(), "mock");

    let client = config.client_builder().shared_generator(generator).build().unwrap();
    let summary = client.summarize("a short document").await.unwrap();
    assert!(summary.output.text.starts_with('•'));

    let mindmap = client.generate_mindmap("a short document").await.unwrap();
    assert_eq!(mindmap.output.root.title, "Document");

    // Canned calls are still priced.
    assert_eq!(client.ledger().entries().len(), 2);
    assert!(client.ledger().daily_spend() > Decimal::ZERO);
}
