use anyhow::Result;
use std::io::Write;

use crate::report::RunReport;

/// Writes the run reports as a JSON array.
pub fn export_json(reports: &[RunReport], pretty: bool, output: &mut dyn Write) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(reports)?
    } else {
        serde_json::to_string(reports)?
    };
    writeln!(output, "{json}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_export_as_array() {
        let reports = vec![RunReport::failed("a.toml", "boom"), RunReport::new("b.toml")];
        let mut buffer = Vec::new();
        export_json(&reports, false, &mut buffer).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(2));
        assert_eq!(parsed[0]["state"], "FAILED");
        assert_eq!(parsed[0]["error"], "boom");
        assert_eq!(parsed[1]["state"], "PENDING");
    }
}
