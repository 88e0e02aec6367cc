use crate::{
    check::{
        CallReport,
        ContractCheck,
    },
    cli::Args,
    json_rpc_client::Client,
};
use anyhow::{
    Context,
    Result,
    bail,
};
use clap::Parser;
use contract_introspect::ArtifactRegistry;
use std::path::Path;
use tracing::{
    error,
    info,
};
use tracing_subscriber::EnvFilter;

mod check;
mod cli;
mod json_rpc_client;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let registry = load_registry(&args.bundle)?;

    let names = if args.contracts.is_empty() {
        check::default_targets(&registry)
    } else {
        args.contracts.clone()
    };
    if names.is_empty() && args.calls.is_empty() {
        bail!("no contracts to check in {}", args.bundle.display());
    }
    info!(
        contracts = names.len(),
        calls = args.calls.len(),
        check_code = args.check_code,
        "Checking deployment"
    );

    let client = Client::try_new_with_rpc_url(&args.rpc_url)
        .await
        .with_context(|| format!("failed to connect to {}", args.rpc_url))?;

    let check_code = args.check_code;
    let targets = args.calls.clone();
    let (checks, calls) = tokio::task::spawn_blocking(move || {
        (
            check::run(&registry, &client, &names, check_code),
            check::run_calls(&registry, &client, &targets),
        )
    })
    .await
    .context("check task failed")?;

    if args.json {
        let report = serde_json::json!({ "contracts": checks, "calls": calls });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        log_checks(&checks);
        log_calls(&calls);
    }

    let failed = checks.iter().filter(|check| !check.passed()).count();
    let failed_calls = calls.iter().filter(|call| call.error.is_some()).count();
    if failed > 0 || failed_calls > 0 {
        bail!(
            "{failed} of {} contracts failed the check, {failed_calls} of {} calls failed",
            checks.len(),
            calls.len()
        );
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_registry(path: &Path) -> Result<ArtifactRegistry> {
    let bundle = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read bundle {}", path.display()))?;
    ArtifactRegistry::from_bundle_json(&bundle)
        .with_context(|| format!("failed to load bundle {}", path.display()))
}

fn log_checks(checks: &[ContractCheck]) {
    for check in checks {
        let report = &check.initialized;
        match (&report.error, report.initialized) {
            (Some(err), _) => error!(name = %report.name, "{err}"),
            (None, Some(value)) if check.passed() => {
                info!(
                    name = %report.name,
                    address = ?report.address,
                    initialized = value,
                    code_matches = ?check.code_matches,
                    "Contract initialized"
                );
            }
            (None, value) => {
                error!(
                    name = %report.name,
                    address = ?report.address,
                    initialized = ?value,
                    code_matches = ?check.code_matches,
                    code_error = ?check.code_error,
                    "Contract failed the check"
                );
            }
        }
    }
}

fn log_calls(calls: &[CallReport]) {
    for call in calls {
        match (&call.outputs, &call.error) {
            (Some(outputs), _) => info!(call = %call.call, outputs = ?outputs, "Read call"),
            (None, error) => error!(call = %call.call, error = ?error, "Read call failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_registry_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"addresses":{{"SystemConfigProxy":"0x0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b"}}}}"#
        )
        .unwrap();

        let registry = load_registry(file.path()).unwrap();
        assert_eq!(
            registry.deployment_names().collect::<Vec<_>>(),
            vec!["SystemConfigProxy"]
        );
    }

    #[test]
    fn missing_bundle_names_path() {
        let err = load_registry(Path::new("/nonexistent/bundle.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/bundle.json"));
    }
}
