use aws_config::{BehaviorVersion, meta::region::RegionProviderChain};
use figment::{Figment, providers::Env};

pub trait ContextProvider<Config> {
    fn new(
        config: Config,
        aws_config: aws_config::SdkConfig,
    ) -> impl Future<Output = Self>;
}

/// Install the JSON subscriber used by every function.
///
/// `RUST_LOG` controls the level. Calling this twice is harmless, the second
/// call is ignored.
pub fn init_tracing() {
    // https://docs.aws.amazon.com/lambda/latest/dg/rust-logging.html
    let _ = tracing_subscriber::fmt()
        .json()
        // allow log level to be overridden by RUST_LOG env var
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        // this needs to be set to remove duplicated information in the log.
        .with_current_span(false)
        // this needs to be set to false, otherwise ANSI color codes will
        // show up in a confusing manner in CloudWatch logs.
        .with_ansi(false)
        // disabling time is handy because CloudWatch will add the ingestion time.
        .without_time()
        // remove the name of the function from every log entry
        .with_target(false)
        .try_init();
}

/// Extract a function's configuration from the given figment.
///
/// # Errors
/// If a required key is missing or has the wrong type.
pub fn extract_config<'a, Config: serde::Deserialize<'a>>(
    figment: &Figment,
) -> Result<Config, figment::Error> {
    figment.extract()
}

/// Initialize the application context with configuration from environment variables.
/// The configuration is extracted using figment.
/// The AWS configuration is loaded using the default provider chain.
///
/// # Returns
/// The application context with the configuration and AWS configuration as
/// specified by the trait.
///
/// # Errors
/// If the configuration cannot be extracted from the environment variables.
///
pub async fn create_app_context<'a, A, Config: serde::Deserialize<'a>>()
-> Result<A, figment::Error>
where
    A: ContextProvider<Config>,
{
    init_tracing();

    let figment = Figment::new().merge(Env::raw());

    let config: Config = extract_config(&figment)?;

    let region_provider =
        RegionProviderChain::default_provider().or_else("us-east-1");
    let aws_config = aws_config::defaults(BehaviorVersion::latest())
        .region(region_provider)
        .load()
        .await;

    let context = A::new(config, aws_config).await;

    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        settings_table: String,
        #[serde(default = "default_lease")]
        run_lease_minutes: i64,
    }

    const fn default_lease() -> i64 {
        15
    }

    #[test]
    fn test_extract_config_applies_defaults() {
        let figment = Figment::new().merge(Serialized::default(
            "settings_table",
            "publishing-settings",
        ));

        let config: TestConfig = extract_config(&figment).unwrap();

        assert_eq!(config.settings_table, "publishing-settings");
        assert_eq!(config.run_lease_minutes, 15);
    }

    #[test]
    fn test_extract_config_reports_missing_keys() {
        let figment = Figment::new();

        let result: Result<TestConfig, _> = extract_config(&figment);

        assert!(result.is_err());
    }
}
