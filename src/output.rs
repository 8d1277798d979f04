use crate::account::{Plan, User};
use crate::models::{Metric, RunReport, SuggestionOutcome};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Print a validation report in the specified format
pub fn print_report(report: &RunReport, format: OutputFormat) {
    match format {
        OutputFormat::Plain => print!("{}", render_plain(report)),
        OutputFormat::Json => print_json(report),
    }
}

/// Print the signed-in user, if any
pub fn print_user(user: Option<&User>, format: OutputFormat) {
    match format {
        OutputFormat::Plain => match user {
            Some(user) => println!(
                "Signed in as {} ({} plan, {} uses remaining)",
                user.email, user.plan, user.uses_remaining
            ),
            None => println!("Not signed in."),
        },
        OutputFormat::Json => print_json(&user),
    }
}

/// Print every plan, marking the current one
pub fn print_plans(current: Option<Plan>, format: OutputFormat) {
    match format {
        OutputFormat::Plain => print!("{}", render_plans(current)),
        OutputFormat::Json => {
            let plans: Vec<_> = Plan::ALL
                .iter()
                .map(|plan| {
                    json!({
                        "plan": plan,
                        "price": plan.price(),
                        "uses": plan.uses(),
                        "description": plan.description(),
                        "current": Some(*plan) == current,
                    })
                })
                .collect();
            print_json(&plans);
        }
    }
}

/// Coarse band for a 0-100 score
fn score_band(score: f64) -> &'static str {
    if score >= 80.0 {
        "good"
    } else if score >= 50.0 {
        "fair"
    } else {
        "poor"
    }
}

fn render_metric(out: &mut String, label: &str, metric: &Metric) {
    out.push_str(&format!(
        "  • {:<17} {:>5.1}/100 [{}]\n      {}\n",
        format!("{label}:"),
        metric.score(),
        score_band(metric.score()),
        metric.justification()
    ));
}

fn render_plain(report: &RunReport) -> String {
    let mut out = String::new();

    out.push_str("📝 AI RESPONSE\n");
    out.push_str("--------------\n");
    out.push_str(&format!("Model: {}\n", report.model));
    out.push_str(&format!("Prompt: {}\n", report.prompt));
    if let Some(reference) = &report.reference {
        out.push_str(&format!("Reference: {}\n", reference));
    }
    out.push('\n');
    out.push_str(report.result.ai_response.trim());
    out.push_str("\n\n");

    out.push_str("📊 VALIDATION SCORES\n");
    out.push_str("--------------------\n");
    for (label, metric) in report.result.metrics() {
        render_metric(&mut out, label, metric);
    }
    if report.reference.is_none() {
        out.push_str("  (add a reference answer to score similarity and validity)\n");
    }
    out.push('\n');

    match &report.suggestions {
        SuggestionOutcome::Suggested { prompts } if !prompts.is_empty() => {
            out.push_str("💡 PROMPT IMPROVEMENT SUGGESTIONS\n");
            out.push_str("---------------------------------\n");
            out.push_str("Scores were low. Try one of these improved prompts for a better result.\n");
            for (i, prompt) in prompts.iter().enumerate() {
                out.push_str(&format!("  {}. {}\n", i + 1, prompt));
            }
            out.push('\n');
        }
        _ => {}
    }

    match report.uses_remaining {
        Some(uses) => out.push_str(&format!("Uses remaining: {uses}\n")),
        None => out.push_str("Uses remaining: unknown (this run could not be recorded)\n"),
    }
    out
}

fn render_plans(current: Option<Plan>) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<10} {:<11} {:<7} {}\n",
        "Plan", "Price", "Uses", "Description"
    ));
    out.push_str(&format!("{}\n", "-".repeat(70)));
    for plan in Plan::ALL {
        let marker = if Some(plan) == current { " (current)" } else { "" };
        out.push_str(&format!(
            "{:<10} {:<11} {:<7} {}{}\n",
            plan.to_string(),
            plan.price(),
            plan.uses(),
            plan.description(),
            marker
        ));
    }
    out
}

/// Print a value as pretty JSON
fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing results to JSON: {}", e),
    }
}
