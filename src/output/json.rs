use crate::model::ScanResult;
use anyhow::{Context, Result};

pub fn print_json(result: &ScanResult) -> Result<()> {
    let json = serde_json::to_string_pretty(result).context("Failed to serialize scan result")?;
    println!("{}", json);
    Ok(())
}
