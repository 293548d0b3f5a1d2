use std::path::Path;

use nodemedic_healer::HealerSettings;
use serde_json::json;

pub fn check(file: &Path) -> anyhow::Result<()> {
    let settings = HealerSettings::from_file(file)?;
    println!("{}", serde_json::to_string_pretty(&render(&settings))?);
    Ok(())
}

fn render(settings: &HealerSettings) -> serde_json::Value {
    json!({
        "failures_before_healing": settings.failures_before_healing,
        "disabled_time": format!("{:?}", settings.disabled_time),
        "wait_new_machine": format!("{:?}", settings.wait_new_machine),
        "active_interval": format!("{:?}", settings.active_interval),
        "active_healing": settings.active_healing,
        "throttling": {
            "max": settings.throttle_max,
            "window": format!("{:?}", settings.throttle_window),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_resolved_values() {
        let settings = HealerSettings::from_toml_str(
            r#"
            [healer]
            failures_before_healing = 2
            active_interval = "500ms"
            "#,
        )
        .unwrap();
        let value = render(&settings);
        assert_eq!(value["failures_before_healing"], 2);
        assert_eq!(value["active_interval"], "500ms");
        assert_eq!(value["disabled_time"], "30s");
        assert_eq!(value["throttling"]["max"], 3);
    }

    #[test]
    fn check_reports_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("healer.toml");
        std::fs::write(&path, "[healer]\ndisabled_time = \"soon\"\n").unwrap();
        let err = check(&path).unwrap_err();
        assert!(err.to_string().contains("disabled_time"));
    }
}
