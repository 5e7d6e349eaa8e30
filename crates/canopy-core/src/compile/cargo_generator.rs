//! Cargo manifest generation for canister crates.

use std::fmt;

use crate::paths::GENERATOR_CRATE_DIR;

/// Value of the `opt-level` profile key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    /// Numeric level (0-3).
    Speed(u8),
    /// `"s"`: optimize for size.
    Size,
    /// `"z"`: optimize aggressively for size.
    MinSize,
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Speed(level) => write!(f, "{level}"),
            Self::Size => f.write_str("\"s\""),
            Self::MinSize => f.write_str("\"z\""),
        }
    }
}

/// Options for the release profile in Cargo.toml.
#[derive(Debug, Clone)]
pub struct ReleaseProfile {
    pub opt_level: OptLevel,
    /// Enable Link-Time Optimization.
    pub lto: bool,
    pub codegen_units: u32,
}

impl Default for ReleaseProfile {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::Speed(3),
            lto: false,
            codegen_units: 16,
        }
    }
}

impl ReleaseProfile {
    /// Profile for canister binaries, which are size-limited on upload.
    pub fn canister() -> Self {
        Self {
            opt_level: OptLevel::MinSize,
            lto: true,
            codegen_units: 1,
        }
    }
}

/// A crates.io dependency of the generated canister.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrateDependency {
    pub name: &'static str,
    pub version: &'static str,
    pub features: &'static [&'static str],
    pub default_features: bool,
}

impl CrateDependency {
    const fn new(name: &'static str, version: &'static str) -> Self {
        Self {
            name,
            version,
            features: &[],
            default_features: true,
        }
    }

    const fn with_features(mut self, features: &'static [&'static str]) -> Self {
        self.features = features;
        self
    }

    const fn without_default_features(mut self) -> Self {
        self.default_features = false;
        self
    }
}

/// Crates every generated canister links against.
pub const CANISTER_DEPENDENCIES: &[CrateDependency] = &[
    CrateDependency::new("candid", "0.8.4"),
    CrateDependency::new("ic-cdk", "0.7.4"),
    CrateDependency::new("ic-cdk-macros", "0.6.10"),
    CrateDependency::new("ic-cdk-timers", "0.1.2"),
    CrateDependency::new("ic-stable-structures", "0.5.2"),
    CrateDependency::new("getrandom", "0.2.8").with_features(&["custom"]),
    CrateDependency::new("serde", "1.0.152").with_features(&["derive"]),
    CrateDependency::new("rustpython-vm", "0.2.0")
        .with_features(&["freeze-stdlib", "compiler"])
        .without_default_features(),
    CrateDependency::new("rustpython-stdlib", "0.2.0"),
    CrateDependency::new("rustpython-derive", "0.2.0"),
];

/// Configuration for generating a Cargo manifest.
#[derive(Debug, Clone)]
pub struct ManifestConfig<'a> {
    /// Package name.
    pub name: &'a str,
    /// Package version.
    pub version: &'a str,
    /// Rust edition.
    pub edition: &'a str,
    /// Library crate types (if building a library).
    pub lib_crate_types: Option<&'a [&'a str]>,
    /// Release profile settings.
    pub release_profile: Option<ReleaseProfile>,
    /// Members of the `[workspace]` table. `None` omits the table.
    pub workspace_members: Option<&'a [&'a str]>,
}

impl<'a> Default for ManifestConfig<'a> {
    fn default() -> Self {
        Self {
            name: "generated",
            version: "0.0.0",
            edition: "2018",
            lib_crate_types: None,
            release_profile: None,
            workspace_members: None,
        }
    }
}

impl<'a> ManifestConfig<'a> {
    /// Manifest of a canister crate: a size-optimized `cdylib` in a workspace
    /// with the code generator crate, so both share one target directory.
    pub fn canister(name: &'a str) -> Self {
        Self {
            name,
            lib_crate_types: Some(&["cdylib"]),
            release_profile: Some(ReleaseProfile::canister()),
            workspace_members: Some(&[GENERATOR_CRATE_DIR]),
            ..Default::default()
        }
    }
}

/// Generate a Cargo.toml manifest.
pub fn generate_cargo_toml(config: &ManifestConfig<'_>, dependencies: &[CrateDependency]) -> String {
    let mut toml = String::new();

    if let Some(members) = config.workspace_members {
        toml.push_str("[workspace]\n");
        let members: Vec<_> = members.iter().map(|m| format!("\"{m}\"")).collect();
        toml.push_str(&format!("members = [{}]\n", members.join(", ")));
        toml.push('\n');
    }

    toml.push_str("[package]\n");
    toml.push_str(&format!("name = \"{}\"\n", config.name));
    toml.push_str(&format!("version = \"{}\"\n", config.version));
    toml.push_str(&format!("edition = \"{}\"\n", config.edition));
    toml.push('\n');

    if let Some(crate_types) = config.lib_crate_types {
        toml.push_str("[lib]\n");
        let types: Vec<_> = crate_types.iter().map(|t| format!("\"{t}\"")).collect();
        toml.push_str(&format!("crate-type = [{}]\n", types.join(", ")));
        toml.push('\n');
    }

    if let Some(profile) = &config.release_profile {
        toml.push_str("[profile.release]\n");
        toml.push_str(&format!("opt-level = {}\n", profile.opt_level));
        if profile.lto {
            toml.push_str("lto = true\n");
        }
        toml.push_str(&format!("codegen-units = {}\n", profile.codegen_units));
        toml.push('\n');
    }

    toml.push_str("[dependencies]\n");
    for dep in dependencies {
        format_dependency(&mut toml, dep);
    }

    toml
}

/// Manifest for the canister crate `name` with the standard runtime crates.
pub fn canister_manifest(name: &str) -> String {
    generate_cargo_toml(&ManifestConfig::canister(name), CANISTER_DEPENDENCIES)
}

fn format_dependency(toml: &mut String, dep: &CrateDependency) {
    if dep.features.is_empty() && dep.default_features {
        toml.push_str(&format!("{} = \"{}\"\n", dep.name, dep.version));
        return;
    }

    let mut fields = vec![format!("version = \"{}\"", dep.version)];
    if !dep.default_features {
        fields.push("default-features = false".to_string());
    }
    if !dep.features.is_empty() {
        let features: Vec<_> = dep.features.iter().map(|f| format!("\"{f}\"")).collect();
        fields.push(format!("features = [{}]", features.join(", ")));
    }
    toml.push_str(&format!("{} = {{ {} }}\n", dep.name, fields.join(", ")));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canister_manifest() {
        let toml = canister_manifest("backend");

        assert!(toml.starts_with("[workspace]\nmembers = [\"canopy_generate\"]\n"));
        assert!(toml.contains("name = \"backend\""));
        assert!(toml.contains("crate-type = [\"cdylib\"]"));
        assert!(toml.contains("opt-level = \"z\""));
        assert!(toml.contains("lto = true"));
        assert!(toml.contains("codegen-units = 1"));
        assert!(toml.contains("ic-cdk = \"0.7.4\""));
    }

    #[test]
    fn test_basic_manifest() {
        let config = ManifestConfig {
            name: "my_crate",
            ..Default::default()
        };
        let toml = generate_cargo_toml(&config, &[CrateDependency::new("candid", "0.8")]);

        assert!(toml.starts_with("[package]"));
        assert!(!toml.contains("[workspace]"));
        assert!(!toml.contains("[lib]"));
        assert!(toml.contains("candid = \"0.8\""));
    }

    #[test]
    fn test_dependency_tables() {
        let deps = [
            CrateDependency::new("serde", "1.0").with_features(&["derive"]),
            CrateDependency::new("vm", "0.2")
                .with_features(&["a", "b"])
                .without_default_features(),
        ];
        let toml = generate_cargo_toml(&ManifestConfig::default(), &deps);

        assert!(toml.contains("serde = { version = \"1.0\", features = [\"derive\"] }"));
        assert!(toml.contains(
            "vm = { version = \"0.2\", default-features = false, features = [\"a\", \"b\"] }"
        ));
    }

    #[test]
    fn test_opt_level_rendering() {
        assert_eq!(OptLevel::Speed(2).to_string(), "2");
        assert_eq!(OptLevel::Size.to_string(), "\"s\"");
        assert_eq!(OptLevel::MinSize.to_string(), "\"z\"");
    }
}
