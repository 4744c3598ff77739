use colored::*;
use composeguard_core::report::{Finding, Report, Severity};
use composeguard_core::rules::network::NetworkAnalysis;
use composeguard_core::scanner::BatchScanResult;
use composeguard_core::topology::Topology;

fn severity_tag(severity: Severity) -> String {
    let label = format!(" {} ", severity.symbol());
    match severity {
        Severity::Critical => label.on_red().white().bold().to_string(),
        Severity::High => label.on_yellow().black().bold().to_string(),
        Severity::Medium => label.on_blue().white().bold().to_string(),
        Severity::Low | Severity::Info => label.dimmed().to_string(),
    }
}

fn score_colored(score: u8) -> ColoredString {
    let text = format!("{}/100", score);
    match score {
        80..=100 => text.green().bold(),
        50..=79 => text.yellow().bold(),
        _ => text.red().bold(),
    }
}

/// Print a full validation report to the terminal.
pub fn print_report(report: &Report, source: &str) {
    println!();
    println!(
        "{}",
        format!(" composeguard v{}: {}", env!("CARGO_PKG_VERSION"), source).bold()
    );
    println!();

    if report.findings.is_empty() {
        println!(" {} No security issues found.", "OK".green().bold());
    } else {
        for finding in &report.findings {
            print_finding(finding);
            println!();
        }
    }

    println!(" {}", "=".repeat(60).dimmed());
    println!();
    println!(" {}", "Summary".bold().underline());
    println!(" {} Score: {}", "|-".dimmed(), score_colored(report.score));

    let counts: Vec<String> = Severity::ALL
        .iter()
        .map(|&sev| {
            let n = report.summary.count(sev);
            let text = format!("{} {}", n, sev);
            match sev {
                Severity::Critical if n > 0 => text.red().bold().to_string(),
                Severity::High if n > 0 => text.yellow().bold().to_string(),
                _ => text,
            }
        })
        .collect();
    println!(" {} Findings: {}", "|-".dimmed(), counts.join(", "));

    if !report.recommendations.is_empty() {
        println!();
        println!(" {}", "Top recommendations".bold().underline());
        for rec in report.recommendations.iter().take(5) {
            println!(" {} [{}] {}", "|-".dimmed(), rec.rule.cyan(), rec.fix);
        }
    }

    if let Some(topology) = &report.topology {
        if !topology.external_access_points.is_empty() {
            println!();
            println!(
                " {} Published to the host: {}",
                "|-".dimmed(),
                topology.external_access_points.join(", ").yellow()
            );
        }
    }
    println!();
}

fn print_finding(finding: &Finding) {
    let location = match (&finding.scope, finding.line) {
        (Some(service), _) => format!(" ({})", service),
        (None, Some(line)) => format!(" (line {})", line),
        (None, None) => String::new(),
    };
    println!(
        " {} [{}]{}",
        severity_tag(finding.severity),
        finding.rule.dimmed(),
        location.dimmed()
    );
    println!("   {} {}", "|".dimmed(), finding.message);
    println!("   {} Fix: {}", "|".dimmed(), finding.fix.green());
}

/// Print secret scan results grouped by file.
pub fn print_scan_result(result: &BatchScanResult) {
    println!();
    println!("{}", " composeguard secret scan".bold());
    println!();

    if result.files.is_empty() {
        println!(
            " {} No secrets found in {} file(s).",
            "OK".green().bold(),
            result.files_scanned
        );
        println!();
        return;
    }

    for file in &result.files {
        println!(" {}", file.path.bold());
        for m in &file.matches {
            println!(
                "   {} {}:{} {} {}",
                severity_tag(m.severity),
                m.line,
                m.column,
                m.kind.cyan(),
                m.snippet.dimmed()
            );
        }
        println!();
    }

    println!(
        " {} {} match(es) in {} of {} file(s)",
        "Result:".bold(),
        result.total_matches.to_string().red().bold(),
        result.files_with_findings,
        result.files_scanned
    );
    println!();
}

/// Print topology and network findings.
pub fn print_network_analysis(analysis: &NetworkAnalysis, source: &str) {
    println!();
    println!("{}", format!(" composeguard network map: {}", source).bold());
    println!();

    print_topology(&analysis.topology);

    if !analysis.findings.is_empty() {
        println!(" {}", "Network findings".bold().underline());
        for finding in &analysis.findings {
            print_finding(finding);
        }
        println!();
    }
    println!(" Network score: {}", score_colored(analysis.score));
    println!();
}

fn print_topology(topology: &Topology) {
    if topology.nodes.is_empty() {
        println!(" {}", "No services defined.".dimmed());
        println!();
        return;
    }

    for node in &topology.nodes {
        let marker = if node.external {
            "*".yellow().bold().to_string()
        } else {
            " ".to_string()
        };
        let networks = if node.networks.is_empty() {
            "no networks".dimmed().to_string()
        } else {
            node.networks.join(", ").cyan().to_string()
        };
        println!(" {} {} [{}]", marker, node.name.bold(), networks);

        if node.can_reach.is_empty() {
            println!("   {} {}", "->".dimmed(), "(isolated)".dimmed());
        } else {
            println!("   {} {}", "->".dimmed(), node.can_reach.join(", "));
        }
    }
    println!();
    if !topology.external_access_points.is_empty() {
        println!(" {} publishes ports to the host", "*".yellow().bold());
        println!();
    }
}
