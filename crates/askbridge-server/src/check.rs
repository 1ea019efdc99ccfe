//! `askbridge check` — report what the broker would select, without secrets.

use std::path::{Path, PathBuf};

use askbridge_providers::config::GPT3_MODELS;
use askbridge_providers::{ProviderConfigFile, ProviderType};

#[derive(Debug, Clone)]
pub struct CheckReport {
    pub config_file: PathBuf,
    pub file_present: bool,
    pub provider: String,
    pub model: Option<String>,
    pub api_key_set: bool,
    pub session_token_set: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Resolve the provider selection stored under `data_dir`.
pub fn check(data_dir: &Path) -> CheckReport {
    let config_file = data_dir.join("provider-config.json");
    let mut report = CheckReport {
        file_present: config_file.exists(),
        config_file,
        provider: String::new(),
        model: None,
        api_key_set: false,
        session_token_set: false,
        warnings: Vec::new(),
        errors: Vec::new(),
    };

    if !report.file_present {
        report.warnings.push(format!(
            "Config file not found, using defaults: {}",
            report.config_file.display()
        ));
    }

    let file = match ProviderConfigFile::load(&report.config_file) {
        Ok(file) => file,
        Err(e) => {
            report.errors.push(e.to_string());
            return report;
        }
    };
    report.session_token_set = file.session_token.is_some();

    let configs = file.provider_configs();
    report.provider = configs.provider.clone();
    match configs.provider_type() {
        Ok(ProviderType::ChatGpt) => {
            if !report.session_token_set {
                report.warnings.push(
                    "No session token; access token requests will report UNAUTHORIZED".into(),
                );
            }
        }
        Ok(ProviderType::Gpt3) => match configs.gpt3() {
            Ok(gpt3) => {
                report.api_key_set = true;
                if !GPT3_MODELS.contains(&gpt3.model.as_str()) {
                    report
                        .warnings
                        .push(format!("Model {} is not a known completions model", gpt3.model));
                }
                report.model = Some(gpt3.model.clone());
            }
            Err(e) => report.errors.push(e.to_string()),
        },
        Err(e) => report.errors.push(e.to_string()),
    }

    report
}

pub fn print_report(report: &CheckReport) {
    println!("=== askbridge provider check ===");
    println!();
    println!("Config file:        {}", report.config_file.display());
    println!("Provider:           {}", report.provider);
    if let Some(model) = &report.model {
        println!("Model:              {}", model);
    }
    println!("API key:            {}", if report.api_key_set { "set" } else { "not set" });
    println!("Session token:      {}", if report.session_token_set { "set" } else { "not set" });

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in &report.warnings {
            println!("  - {}", w);
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for e in &report.errors {
            println!("  - {}", e);
        }
    }

    println!();
    if report.is_ok() {
        println!("Status: READY");
    } else {
        println!("Status: MISCONFIGURED");
    }
}
