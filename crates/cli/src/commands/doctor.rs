use advocado_core::config::AppConfig;
use advocado_memory::Manifest;
use serde::Serialize;

use crate::commands::publish::configuration;
use crate::commands::GlobalOptions;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

pub fn run(global: &GlobalOptions, json_output: bool) -> String {
    let report = build_report(global);

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report(global: &GlobalOptions) -> DoctorReport {
    let checks = match global.load_config() {
        Ok(config) => {
            let mut checks = vec![DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            }];
            checks.extend(checks_for(&config));
            checks
        }
        Err(error) => vec![
            DoctorCheck { name: "config_validation", status: CheckStatus::Fail, details: error.to_string() },
            skipped("manifest_sources"),
            skipped("tool_schema"),
        ],
    };
    finalize(checks)
}

/// Checks that need a loaded configuration.
pub fn checks_for(config: &AppConfig) -> Vec<DoctorCheck> {
    let manifest = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| format!("failed to initialize async runtime: {error}"))
        .and_then(|runtime| {
            runtime.block_on(Manifest::from_config(&config.memory)).map_err(|error| error.to_string())
        });

    match manifest {
        Ok(manifest) => vec![manifest_sources(&manifest), tool_schema(config, &manifest)],
        Err(details) => vec![
            DoctorCheck { name: "manifest_sources", status: CheckStatus::Fail, details },
            skipped("tool_schema"),
        ],
    }
}

fn manifest_sources(manifest: &Manifest) -> DoctorCheck {
    let unreadable = manifest
        .documents
        .iter()
        .map(|entry| entry.path())
        .filter(|path| !path.is_file())
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>();

    if unreadable.is_empty() {
        DoctorCheck {
            name: "manifest_sources",
            status: CheckStatus::Pass,
            details: format!("{} manifest sources are readable", manifest.len()),
        }
    } else {
        DoctorCheck {
            name: "manifest_sources",
            status: CheckStatus::Fail,
            details: format!("missing sources: {}", unreadable.join(", ")),
        }
    }
}

fn tool_schema(config: &AppConfig, manifest: &Manifest) -> DoctorCheck {
    match configuration(config, &manifest.sources()) {
        Ok(configuration) => DoctorCheck {
            name: "tool_schema",
            status: CheckStatus::Pass,
            details: format!(
                "{} tool(s) declared, policy {}",
                configuration.tool_declarations.len(),
                configuration.policy_version
            ),
        },
        Err(error) => DoctorCheck { name: "tool_schema", status: CheckStatus::Fail, details: error.to_string() },
    }
}

fn skipped(name: &'static str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: "skipped because configuration did not load".to_string(),
    }
}

fn finalize(checks: Vec<DoctorCheck>) -> DoctorReport {
    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
