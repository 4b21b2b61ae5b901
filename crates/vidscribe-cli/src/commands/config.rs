//! `vidscribe config`: show or change stored settings.

use anyhow::Result;
use vidscribe_core::Settings;
use vidscribe_core::settings::normalize_api_url;

use crate::args::ConfigArgs;

pub fn run(args: ConfigArgs) -> Result<()> {
    let mut settings = Settings::load_stored();
    let changed = apply(&mut settings, &args)?;

    if changed {
        settings.save()?;
        println!("Settings saved to {}", Settings::path().display());
    }

    if args.show || !changed {
        println!("api_url      = {}", settings.api_url);
        println!("ffmpeg_path  = {}", settings.ffmpeg_path);
        println!("timeout_secs = {}", settings.timeout_secs);
    }

    Ok(())
}

/// Apply requested changes, returning whether anything changed.
fn apply(settings: &mut Settings, args: &ConfigArgs) -> Result<bool> {
    let mut changed = false;

    if let Some(url) = &args.api_url {
        settings.api_url = normalize_api_url(url)?;
        changed = true;
    }

    if let Some(path) = &args.ffmpeg_path {
        let path = path.trim();
        if path.is_empty() {
            anyhow::bail!("ffmpeg path cannot be empty");
        }
        settings.ffmpeg_path = path.to_string();
        changed = true;
    }

    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            anyhow::bail!("Timeout must be at least 1 second");
        }
        settings.timeout_secs = timeout;
        changed = true;
    }

    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ConfigArgs {
        ConfigArgs {
            api_url: None,
            ffmpeg_path: None,
            timeout: None,
            show: false,
        }
    }

    #[test]
    fn test_apply_normalizes_url() {
        let mut settings = Settings::default();
        let changed = apply(
            &mut settings,
            &ConfigArgs {
                api_url: Some("https://api.example.com/".to_string()),
                timeout: Some(60),
                ..args()
            },
        )
        .unwrap();

        assert!(changed);
        assert_eq!(settings.api_url, "https://api.example.com");
        assert_eq!(settings.timeout_secs, 60);
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut settings = Settings::default();
        assert!(
            apply(
                &mut settings,
                &ConfigArgs {
                    api_url: Some("ftp://example.com".to_string()),
                    ..args()
                }
            )
            .is_err()
        );
        assert!(
            apply(
                &mut settings,
                &ConfigArgs {
                    timeout: Some(0),
                    ..args()
                }
            )
            .is_err()
        );
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_nothing_requested() {
        let mut settings = Settings::default();
        assert!(!apply(&mut settings, &args()).unwrap());
    }
}
