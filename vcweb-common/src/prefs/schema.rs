//! Preference field catalogs
//!
//! Single source of truth for field names, types, constraints and defaults
//! of both preference subsets. Used by:
//! - The codec (typed decoding, field ordering on encode)
//! - The validator (submitted form values)
//! - The merger (`reset_to_defaults`, display defaults)
//! - The schema API endpoint
//!
//! Defaults are written as strings, the same way a form would submit them,
//! and parsed with the same rules.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::warn;

use super::document::{FieldMap, PrefValue};
use super::Subset;

/// Value type and constraint of a field
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Integer { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Bool,
    Choice { options: &'static [&'static str] },
}

impl FieldKind {
    /// Parse text into a value of this kind, without checking the constraint
    pub fn parse(&self, raw: &str) -> Result<PrefValue, String> {
        let s = raw.trim();
        match self {
            FieldKind::Integer { .. } => s
                .parse::<i64>()
                .map(PrefValue::Int)
                .map_err(|_| "invalid whole number".to_string()),
            FieldKind::Float { .. } => match s.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(PrefValue::Float(v)),
                _ => Err("invalid number format".to_string()),
            },
            FieldKind::Bool => match s.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(PrefValue::Bool(true)),
                "0" | "false" | "no" | "off" => Ok(PrefValue::Bool(false)),
                _ => Err("expected yes or no".to_string()),
            },
            FieldKind::Choice { .. } => Ok(PrefValue::Choice(s.to_string())),
        }
    }

    /// Check a value against the range or option set
    pub fn check(&self, value: &PrefValue) -> Result<(), String> {
        match (self, value) {
            (FieldKind::Integer { min, max }, PrefValue::Int(v)) => {
                if (*min..=*max).contains(v) {
                    Ok(())
                } else {
                    Err(format!("value {} out of range [{}, {}]", v, min, max))
                }
            }
            (FieldKind::Float { min, max }, PrefValue::Float(v)) => {
                if (*min..=*max).contains(v) {
                    Ok(())
                } else {
                    Err(format!("value {} out of range [{}, {}]", v, min, max))
                }
            }
            (FieldKind::Bool, PrefValue::Bool(_)) => Ok(()),
            (FieldKind::Choice { options }, PrefValue::Choice(v)) => {
                if options.contains(&v.as_str()) {
                    Ok(())
                } else {
                    Err(format!("{:?} is not one of: {}", v, options.join(", ")))
                }
            }
            _ => Err("wrong value type".to_string()),
        }
    }
}

/// Metadata for a single preference field
#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub default_value: &'static str,
    pub description: &'static str,
    /// False for fields that only exist in the base set
    pub venue_scoped: bool,
}

impl FieldSpec {
    fn new(
        name: &'static str,
        kind: FieldKind,
        default_value: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            default_value,
            description,
            venue_scoped: true,
        }
    }

    fn base_only(mut self) -> Self {
        self.venue_scoped = false;
        self
    }

    /// Parse and constraint-check a submitted value
    pub fn parse_checked(&self, raw: &str) -> Result<PrefValue, String> {
        let value = self.kind.parse(raw)?;
        self.kind.check(&value)?;
        Ok(value)
    }

    pub fn default_typed(&self) -> Result<PrefValue, String> {
        self.parse_checked(self.default_value)
    }
}

/// Field catalog for one subset
#[derive(Debug)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    index: HashMap<&'static str, usize>,
}

static GLOBAL_SCHEMA: Lazy<Schema> = Lazy::new(|| Schema::new(global_fields()));
static PROJECT_SCHEMA: Lazy<Schema> = Lazy::new(|| Schema::new(project_fields()));

impl Schema {
    fn new(fields: Vec<FieldSpec>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name, i))
            .collect();
        Self { fields, index }
    }

    pub fn for_subset(subset: Subset) -> &'static Schema {
        match subset {
            Subset::Global => &GLOBAL_SCHEMA,
            Subset::Project => &PROJECT_SCHEMA,
        }
    }

    /// Fields in catalog order (also the encode order)
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    /// Catalog position of a field, used to order encoded output
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Documented default for every field
    pub fn defaults(&self) -> FieldMap {
        self.fields
            .iter()
            .filter_map(|spec| match spec.default_typed() {
                Ok(value) => Some((spec.name.to_string(), value)),
                Err(e) => {
                    warn!("{}: bad default {:?}: {}", spec.name, spec.default_value, e);
                    None
                }
            })
            .collect()
    }
}

fn global_fields() -> Vec<FieldSpec> {
    use FieldKind::*;

    vec![
        // When to compute
        FieldSpec::new("run_on_batteries", Bool, "0",
            "Compute while the computer is running on batteries"),
        FieldSpec::new("run_if_user_active", Bool, "1",
            "Compute while the computer is in use"),
        FieldSpec::new("run_gpu_if_user_active", Bool, "0",
            "Use the GPU while the computer is in use"),
        FieldSpec::new("idle_time_to_run", Integer { min: 1, max: 9999 }, "3",
            "Minutes of inactivity before the computer counts as idle"),
        FieldSpec::new("suspend_cpu_usage", Integer { min: 0, max: 100 }, "25",
            "Suspend when non-project CPU usage is above this percentage (0 = never)"),
        FieldSpec::new("start_hour", Float { min: 0.0, max: 24.0 }, "0",
            "Compute only after this hour of the day (equal to end_hour = no restriction)"),
        FieldSpec::new("end_hour", Float { min: 0.0, max: 24.0 }, "0",
            "Compute only before this hour of the day"),
        FieldSpec::new("leave_apps_in_memory", Bool, "0",
            "Leave suspended tasks in memory"),
        FieldSpec::new("cpu_scheduling_period_minutes", Integer { min: 1, max: 9999 }, "60",
            "Switch between tasks every N minutes"),
        // Processor usage
        FieldSpec::new("max_ncpus_pct", Integer { min: 0, max: 100 }, "100",
            "Use at most this percentage of the processors"),
        FieldSpec::new("max_cpu_pct", Integer { min: 1, max: 100 }, "100",
            "Use at most this percentage of CPU time"),
        // Work buffer
        FieldSpec::new("work_buf_min_days", Float { min: 0.0, max: 10.0 }, "0.1",
            "Store at least this many days of work"),
        FieldSpec::new("work_buf_additional_days", Float { min: 0.0, max: 10.0 }, "0.5",
            "Store up to an additional this many days of work"),
        // Network
        FieldSpec::new("net_start_hour", Float { min: 0.0, max: 24.0 }, "0",
            "Transfer files only after this hour of the day"),
        FieldSpec::new("net_end_hour", Float { min: 0.0, max: 24.0 }, "0",
            "Transfer files only before this hour of the day"),
        FieldSpec::new("confirm_before_connecting", Bool, "1",
            "Confirm before connecting to the network"),
        FieldSpec::new("hangup_if_dialed", Bool, "0",
            "Disconnect when done"),
        FieldSpec::new("dont_verify_images", Bool, "0",
            "Skip verification of image files"),
        FieldSpec::new("max_bytes_sec_up", Float { min: 0.0, max: 9_999_999_999.0 }, "0",
            "Limit upload rate to this many bytes/sec (0 = no limit)"),
        FieldSpec::new("max_bytes_sec_down", Float { min: 0.0, max: 9_999_999_999.0 }, "0",
            "Limit download rate to this many bytes/sec (0 = no limit)"),
        FieldSpec::new("daily_xfer_limit_mb", Integer { min: 0, max: 9_999_999 }, "0",
            "Transfer at most this many MB per period (0 = no limit)"),
        FieldSpec::new("daily_xfer_period_days", Integer { min: 0, max: 9999 }, "0",
            "Length of the transfer limit period in days"),
        // Disk and memory
        FieldSpec::new("disk_interval", Integer { min: 0, max: 9_999_999 }, "60",
            "Write to disk at most every N seconds"),
        FieldSpec::new("disk_max_used_gb", Float { min: 0.0, max: 9_999_999.0 }, "100",
            "Use no more than this many GB of disk"),
        FieldSpec::new("disk_max_used_pct", Integer { min: 0, max: 100 }, "90",
            "Use no more than this percentage of total disk space"),
        FieldSpec::new("disk_min_free_gb", Float { min: 0.0, max: 9_999_999.0 }, "0.1",
            "Leave at least this many GB free"),
        FieldSpec::new("vm_max_used_pct", Integer { min: 0, max: 100 }, "75",
            "Use at most this percentage of page file (swap space)"),
        FieldSpec::new("ram_max_used_busy_pct", Integer { min: 1, max: 100 }, "50",
            "Use at most this percentage of memory while the computer is in use"),
        FieldSpec::new("ram_max_used_idle_pct", Integer { min: 1, max: 100 }, "90",
            "Use at most this percentage of memory while the computer is idle"),
    ]
}

/// Screensaver color schemes offered by the project
pub const COLOR_SCHEMES: &[&str] = &["Tahiti Sunset", "Desert Sands", "Underwater", "Nature"];

fn project_fields() -> Vec<FieldSpec> {
    use FieldKind::*;

    vec![
        FieldSpec::new("resource_share", Integer { min: 0, max: 1_000_000 }, "100",
            "Share of this computer's resources relative to other projects"),
        FieldSpec::new("no_cpu", Bool, "0", "Don't use the CPU for this project"),
        FieldSpec::new("no_gpu_nvidia", Bool, "0", "Don't use NVIDIA GPUs"),
        FieldSpec::new("no_gpu_amd", Bool, "0", "Don't use AMD GPUs"),
        FieldSpec::new("no_gpu_intel", Bool, "0", "Don't use Intel GPUs"),
        FieldSpec::new("allow_beta_work", Bool, "0", "Accept test applications"),
        FieldSpec::new("max_jobs", Integer { min: 0, max: 64 }, "0",
            "Run at most this many tasks at once (0 = no limit)"),
        FieldSpec::new("max_cpus", Integer { min: 0, max: 64 }, "0",
            "Use at most this many CPUs per task (0 = no limit)"),
        FieldSpec::new("color_scheme", Choice { options: COLOR_SCHEMES }, "Tahiti Sunset",
            "Screensaver color scheme"),
        FieldSpec::new("send_email", Bool, "1",
            "Send email about project news and account changes").base_only(),
        FieldSpec::new("show_hosts", Bool, "0",
            "Show this account's computers on the web site").base_only(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_defaults_validate() {
        for subset in [Subset::Global, Subset::Project] {
            let schema = Schema::for_subset(subset);
            for spec in schema.fields() {
                assert!(
                    spec.default_typed().is_ok(),
                    "{}: default {:?} rejected",
                    spec.name,
                    spec.default_value
                );
            }
            assert_eq!(schema.defaults().len(), schema.fields().len());
        }
    }

    #[test]
    fn test_field_names_unique() {
        for subset in [Subset::Global, Subset::Project] {
            let schema = Schema::for_subset(subset);
            assert_eq!(schema.index.len(), schema.fields().len());
        }
    }

    #[test]
    fn test_documented_global_defaults() {
        let defaults = Schema::for_subset(Subset::Global).defaults();
        assert_eq!(defaults["max_cpu_pct"], PrefValue::Int(100));
        assert_eq!(defaults["run_on_batteries"], PrefValue::Bool(false));
        assert_eq!(defaults["work_buf_min_days"], PrefValue::Float(0.1));
    }

    #[test]
    fn test_integer_parse_rejects_fraction() {
        let kind = FieldKind::Integer { min: 0, max: 100 };
        assert_eq!(kind.parse(" 42 "), Ok(PrefValue::Int(42)));
        assert!(kind.parse("4.5").is_err());
        assert!(kind.parse("").is_err());
    }

    #[test]
    fn test_float_parse_rejects_non_finite() {
        let kind = FieldKind::Float { min: 0.0, max: 10.0 };
        assert_eq!(kind.parse("2"), Ok(PrefValue::Float(2.0)));
        assert!(kind.parse("NaN").is_err());
        assert!(kind.parse("inf").is_err());
    }

    #[test]
    fn test_bool_spellings() {
        for raw in ["1", "true", "Yes", "on"] {
            assert_eq!(FieldKind::Bool.parse(raw), Ok(PrefValue::Bool(true)));
        }
        for raw in ["0", "false", "NO", "off"] {
            assert_eq!(FieldKind::Bool.parse(raw), Ok(PrefValue::Bool(false)));
        }
        assert!(FieldKind::Bool.parse("maybe").is_err());
    }

    #[test]
    fn test_range_check_message() {
        let spec = Schema::for_subset(Subset::Global)
            .field("max_cpu_pct")
            .unwrap();
        let err = spec.parse_checked("200").unwrap_err();
        assert_eq!(err, "value 200 out of range [1, 100]");
    }

    #[test]
    fn test_choice_check() {
        let spec = Schema::for_subset(Subset::Project)
            .field("color_scheme")
            .unwrap();
        assert!(spec.parse_checked("Nature").is_ok());
        assert!(spec.parse_checked("Neon").is_err());
    }

    #[test]
    fn test_base_only_fields() {
        let schema = Schema::for_subset(Subset::Project);
        assert!(!schema.field("send_email").unwrap().venue_scoped);
        assert!(!schema.field("show_hosts").unwrap().venue_scoped);
        assert!(schema.field("resource_share").unwrap().venue_scoped);
    }
}
