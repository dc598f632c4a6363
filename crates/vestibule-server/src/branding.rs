//! Hydration of per-session branding: logo, colors, site name, locale.
//!
//! Each value is resolved once per session, first source wins:
//! session cache, then the settings store, then the configured default.

use anyhow::Result;

use crate::gate::GateConfig;
use crate::session::{Branding, Palette};
use crate::store::SettingsRepository;

pub const LOGO_PATH_KEY: &str = "companysettings.logoPath";
pub const LEGACY_COLOR_KEY: &str = "companysettings.mainColor";
pub const PRIMARY_COLOR_KEY: &str = "companysettings.primarycolor";
pub const SECONDARY_COLOR_KEY: &str = "companysettings.secondarycolor";
pub const SITE_NAME_KEY: &str = "companysettings.sitename";
pub const LANGUAGE_KEY: &str = "companysettings.language";

pub const DEFAULT_PRIMARY_COLOR: &str = "#1b75bb";
pub const DEFAULT_SECONDARY_COLOR: &str = "#81B1A8";

pub(crate) fn hydrate(
    branding: &mut Branding,
    settings: &dyn SettingsRepository,
    config: &GateConfig,
) -> Result<()> {
    if branding.logo_path.is_none() {
        let logo = settings
            .get_setting(LOGO_PATH_KEY)?
            .unwrap_or_else(|| config.default_logo_path.clone());
        branding.logo_path = Some(absolute_url(&config.base_url, logo));
    }

    match branding.palette.as_mut() {
        None => branding.palette = Some(resolve_palette(settings)?),
        Some(palette) => normalize_palette(palette, config.legacy_color_quirk),
    }

    if branding.site_name.is_none() {
        let name = settings
            .get_setting(SITE_NAME_KEY)?
            .unwrap_or_else(|| config.default_site_name.clone());
        branding.site_name = Some(name);
    }

    // An empty or "0" locale counts as unset and is looked up again.
    if !branding.language.as_deref().is_some_and(is_truthy) {
        let language = settings
            .get_setting(LANGUAGE_KEY)?
            .unwrap_or_else(|| config.default_language.clone());
        branding.language = Some(language);
    }

    Ok(())
}

/// Defaults, overridden by the legacy shared color, overridden by the
/// per-channel keys. A primary color alone also becomes the secondary.
fn resolve_palette(settings: &dyn SettingsRepository) -> Result<Palette> {
    let mut palette = Palette {
        primary: DEFAULT_PRIMARY_COLOR.to_owned(),
        secondary: DEFAULT_SECONDARY_COLOR.to_owned(),
    };

    if let Some(main) = settings.get_setting(LEGACY_COLOR_KEY)? {
        palette.primary = format!("#{main}");
        palette.secondary = format!("#{main}");
    }
    if let Some(primary) = settings.get_setting(PRIMARY_COLOR_KEY)? {
        palette.secondary = primary.clone();
        palette.primary = primary;
    }
    if let Some(secondary) = settings.get_setting(SECONDARY_COLOR_KEY)? {
        palette.secondary = secondary;
    }

    Ok(palette)
}

/// Prefix `#` onto a cached primary color that lacks it.
///
/// With `legacy_quirk` the secondary is rebuilt from the already prefixed
/// primary (yielding `##...`), matching older deployments byte for byte.
/// Otherwise the secondary is normalized on its own.
fn normalize_palette(palette: &mut Palette, legacy_quirk: bool) {
    if palette.primary.starts_with('#') {
        return;
    }
    palette.primary = format!("#{}", palette.primary);
    if legacy_quirk {
        palette.secondary = format!("#{}", palette.primary);
    } else if !palette.secondary.starts_with('#') {
        palette.secondary = format!("#{}", palette.secondary);
    }
}

fn absolute_url(base_url: &str, path: String) -> String {
    if path.starts_with("http") {
        path
    } else {
        format!("{base_url}{path}")
    }
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty() && value != "0"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSettings;

    fn config() -> GateConfig {
        GateConfig {
            base_url: "https://pm.example.com".into(),
            default_logo_path: "/images/logo.svg".into(),
            default_site_name: "Vestibule".into(),
            default_language: "en-US".into(),
            ..GateConfig::default()
        }
    }

    fn hydrated(settings: &FakeSettings) -> Branding {
        let mut b = Branding::default();
        hydrate(&mut b, settings, &config()).unwrap();
        b
    }

    fn palette(b: &Branding) -> (&str, &str) {
        let p = b.palette.as_ref().unwrap();
        (p.primary.as_str(), p.secondary.as_str())
    }

    #[test]
    fn empty_store_falls_back_to_defaults() {
        let b = hydrated(&FakeSettings::default());
        assert_eq!(
            b.logo_path.as_deref(),
            Some("https://pm.example.com/images/logo.svg")
        );
        assert_eq!(palette(&b), (DEFAULT_PRIMARY_COLOR, DEFAULT_SECONDARY_COLOR));
        assert_eq!(b.site_name.as_deref(), Some("Vestibule"));
        assert_eq!(b.language.as_deref(), Some("en-US"));
    }

    #[test]
    fn stored_values_win_over_defaults() {
        let b = hydrated(&FakeSettings::with(&[
            (LOGO_PATH_KEY, "/uploads/acme.png"),
            (SITE_NAME_KEY, "Acme PM"),
            (LANGUAGE_KEY, "de-DE"),
        ]));
        assert_eq!(
            b.logo_path.as_deref(),
            Some("https://pm.example.com/uploads/acme.png")
        );
        assert_eq!(b.site_name.as_deref(), Some("Acme PM"));
        assert_eq!(b.language.as_deref(), Some("de-DE"));
    }

    #[test]
    fn absolute_logo_is_kept() {
        let b = hydrated(&FakeSettings::with(&[(
            LOGO_PATH_KEY,
            "https://cdn.example.net/logo.png",
        )]));
        assert_eq!(
            b.logo_path.as_deref(),
            Some("https://cdn.example.net/logo.png")
        );
    }

    #[test]
    fn primary_alone_also_becomes_secondary() {
        let b = hydrated(&FakeSettings::with(&[(PRIMARY_COLOR_KEY, "#112233")]));
        assert_eq!(palette(&b), ("#112233", "#112233"));
    }

    #[test]
    fn secondary_key_overrides_legacy_for_secondary_only() {
        let b = hydrated(&FakeSettings::with(&[
            (LEGACY_COLOR_KEY, "ff0000"),
            (SECONDARY_COLOR_KEY, "#00ff00"),
        ]));
        assert_eq!(palette(&b), ("#ff0000", "#00ff00"));
    }

    #[test]
    fn modern_keys_beat_legacy() {
        let b = hydrated(&FakeSettings::with(&[
            (LEGACY_COLOR_KEY, "ff0000"),
            (PRIMARY_COLOR_KEY, "#0000ff"),
        ]));
        assert_eq!(palette(&b), ("#0000ff", "#0000ff"));
    }

    #[test]
    fn hydration_runs_once_per_session() {
        let settings = FakeSettings::with(&[(SITE_NAME_KEY, "Acme PM")]);
        let mut b = Branding::default();
        hydrate(&mut b, &settings, &config()).unwrap();
        let reads = settings.reads();
        assert!(reads > 0);

        settings.set(SITE_NAME_KEY, "Renamed");
        hydrate(&mut b, &settings, &config()).unwrap();
        assert_eq!(settings.reads(), reads);
        assert_eq!(b.site_name.as_deref(), Some("Acme PM"));
    }

    #[test]
    fn falsy_language_is_resolved_every_time() {
        let settings = FakeSettings::with(&[(LANGUAGE_KEY, "")]);
        let mut b = Branding::default();
        hydrate(&mut b, &settings, &config()).unwrap();
        assert_eq!(b.language.as_deref(), Some(""));

        let reads = settings.reads();
        hydrate(&mut b, &settings, &config()).unwrap();
        assert_eq!(settings.reads(), reads + 1);

        settings.set(LANGUAGE_KEY, "fr-FR");
        hydrate(&mut b, &settings, &config()).unwrap();
        assert_eq!(b.language.as_deref(), Some("fr-FR"));
    }

    #[test]
    fn zero_language_is_falsy() {
        let mut b = Branding {
            language: Some("0".into()),
            ..Default::default()
        };
        hydrate(&mut b, &FakeSettings::default(), &config()).unwrap();
        assert_eq!(b.language.as_deref(), Some("en-US"));
    }

    #[test]
    fn cached_unprefixed_colors_are_normalized() {
        let mut p = Palette {
            primary: "1b75bb".into(),
            secondary: "81B1A8".into(),
        };
        normalize_palette(&mut p, false);
        assert_eq!(p.primary, "#1b75bb");
        assert_eq!(p.secondary, "#81B1A8");
    }

    #[test]
    fn legacy_quirk_derives_secondary_from_primary() {
        let mut p = Palette {
            primary: "1b75bb".into(),
            secondary: "81B1A8".into(),
        };
        normalize_palette(&mut p, true);
        assert_eq!(p.primary, "#1b75bb");
        assert_eq!(p.secondary, "##1b75bb");
    }

    #[test]
    fn prefixed_palette_is_left_alone() {
        let mut p = Palette {
            primary: "#123456".into(),
            secondary: "abcdef".into(),
        };
        normalize_palette(&mut p, false);
        assert_eq!(p.secondary, "abcdef");
    }
}
