use crate::model::{LayerScan, ScanResult};
use anyhow::Result;
use std::collections::BTreeSet;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct FeatureRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Source Package")]
    source_name: String,
    #[tabled(rename = "Source Version")]
    source_version: String,
}

pub fn print_cli_table(result: &ScanResult) -> Result<()> {
    println!("{}", render_cli_table(result));
    Ok(())
}

pub fn render_cli_table(result: &ScanResult) -> String {
    let mut out = String::new();

    line(
        &mut out,
        format!(
            "Scan completed at: {}",
            result.scan_time.format("%Y-%m-%d %H:%M:%S UTC")
        ),
    );

    for layer in &result.layers {
        out.push('\n');
        render_layer(&mut out, layer);
    }

    out.push('\n');
    render_summary(&mut out, result);
    out
}

fn line(out: &mut String, text: impl AsRef<str>) {
    out.push_str(text.as_ref());
    out.push('\n');
}

fn render_layer(out: &mut String, layer: &LayerScan) {
    line(out, format!("{} ({})", layer.root.display(), layer.detector));

    if let Some(error) = &layer.error {
        line(out, format!("  Error: {}", error));
        return;
    }

    if layer.features.is_empty() {
        line(out, "  No packages found.");
        return;
    }

    line(out, format!("  Found {} packages:", layer.features.len()));
    let rows: Vec<FeatureRow> = layer
        .features
        .iter()
        .map(|f| FeatureRow {
            name: truncate(&f.name, 40),
            version: truncate(&f.version, 40),
            source_name: truncate(&f.source_name, 40),
            source_version: truncate(&f.source_version, 40),
        })
        .collect();

    line(out, Table::new(rows).with(Style::rounded()).to_string());
}

fn render_summary(out: &mut String, result: &ScanResult) {
    let features = || result.layers.iter().flat_map(|l| l.features.iter());
    let sources: BTreeSet<&str> = features().map(|f| f.source_name.as_str()).collect();
    let split = features().filter(|f| !f.is_self_sourced()).count();
    let failed = result.layers.iter().filter(|l| l.error.is_some()).count();

    line(out, "Summary:");
    line(out, format!("  Roots scanned: {}", result.layers.len()));
    line(out, format!("  Total packages: {}", result.feature_count()));
    line(out, format!("  Source packages: {}", sources.len()));
    line(out, format!("  Built from another source: {}", split));
    if failed > 0 {
        line(out, format!("  Failed roots: {}", failed));
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() > max_len {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Feature;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("bash", 40), "bash");
        assert_eq!(truncate("rpm-plugin-systemd-inhibit", 10), "rpm-plu...");
    }

    #[test]
    fn test_render_cli_table() {
        let result = ScanResult::new(vec![
            LayerScan::new(
                "layer-1".into(),
                "rpm",
                vec![
                    Feature::new("glibc", "2.27-32.fc28", "glibc", "2.27-32.fc28", "rpm"),
                    Feature::new("glibc-common", "2.27-32.fc28", "glibc", "2.27-32.fc28", "rpm"),
                ],
            ),
            LayerScan::new("layer-2".into(), "rpm", vec![]),
            LayerScan::failed(
                "layer-3".into(),
                "rpm",
                "malformed entries in package database (1): a (source RPM 'fc28.src.rpm'): \
                 unexpected termination while parsing 'Release Token'",
            ),
        ]);

        let text = render_cli_table(&result);

        assert!(text.contains("Found 2 packages:"));
        assert!(text.contains("glibc-common"));
        assert!(text.contains("No packages found."));
        assert!(text.contains("Error: malformed entries in package database (1)"));
        assert!(text.contains("Total packages: 2"));
        assert!(text.contains("Source packages: 1"));
        assert!(text.contains("Built from another source: 1"));
        assert!(text.contains("Failed roots: 1"));
    }
}
