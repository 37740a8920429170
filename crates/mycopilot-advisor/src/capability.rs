//! Device capability filtering.
//!
//! The capability manifest is the authoritative list of control points a
//! room's physical equipment actually exposes. Proposals from reasoning
//! are filtered against it so the pipeline never recommends adjusting a
//! point that does not exist. The manifest is loaded once per process
//! and shared read-only across rooms.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use serde::{Deserialize, Serialize};

use crate::decision::{DeviceRecommendation, PointAdjustment};
use crate::error::AdvisorError;
use crate::reasoning::ReasonedDecision;

/// How a point's value changes: continuously or across discrete states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    /// Numeric setpoint with a change threshold.
    Analog,
    /// Discrete setpoint with an enum mapping.
    Enum,
}

/// One controllable point of a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointSpec {
    /// Stable alias used in recommendations, e.g. "target_humidity".
    pub point_alias: String,
    /// Vendor point name on the wire.
    pub point_name: String,
    #[serde(default)]
    pub remark: Option<String>,
    pub change_type: PointKind,
    /// Minimum meaningful delta for analog points.
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Value -> label mapping for enum points.
    #[serde(default)]
    pub enum_mapping: Option<HashMap<String, serde_json::Value>>,
}

impl PointSpec {
    /// Whether a proposal differs meaningfully from the current value.
    ///
    /// Analog: `|new − old| ≥ threshold`. Enum: `new != old`. Without a
    /// comparable current value there is no basis for a no-op claim, so
    /// the change is assumed needed.
    pub fn change_needed(&self, current: Option<&serde_json::Value>, recommended: &serde_json::Value) -> bool {
        match self.change_type {
            PointKind::Analog => {
                let old = current.and_then(|v| v.as_f64());
                let new = recommended.as_f64();
                match (old, new) {
                    (Some(old), Some(new)) => {
                        let threshold = self.threshold.unwrap_or(f64::EPSILON);
                        (new - old).abs() >= threshold
                    }
                    _ => true,
                }
            }
            PointKind::Enum => match current {
                Some(old) => old != recommended,
                None => true,
            },
        }
    }
}

/// Everything one device type exposes in one room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCapability {
    pub device_name: String,
    pub device_alias: String,
    #[serde(default)]
    pub point_list: Vec<PointSpec>,
}

/// Device types and points per room.
pub type RoomCapabilities = HashMap<String, DeviceCapability>;

/// Manifest document: room_id -> device_type -> capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityManifest {
    #[serde(flatten)]
    pub rooms: HashMap<String, RoomCapabilities>,
}

/// A manifest plus where it came from.
#[derive(Debug)]
pub struct LoadedManifest {
    manifest: CapabilityManifest,
    source: String,
}

/// Global manifest singleton (thread-safe). Loaded once per process; a
/// manifest edit on disk is not observed until restart.
static MANIFEST_CACHE: StdMutex<Option<Arc<LoadedManifest>>> = StdMutex::new(None);

impl LoadedManifest {
    /// Load a manifest JSON file, reusing the cached copy for repeated
    /// loads of the same path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Arc<Self>, AdvisorError> {
        let source = path.as_ref().to_string_lossy().to_string();

        {
            let cache = MANIFEST_CACHE
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(loaded) = cache.as_ref() {
                if loaded.source == source {
                    return Ok(loaded.clone());
                }
            }
        }

        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AdvisorError::ManifestLoad(format!("{}: {}", source, e)))?;
        let manifest: CapabilityManifest = serde_json::from_str(&raw)
            .map_err(|e| AdvisorError::ManifestLoad(format!("{}: {}", source, e)))?;

        let loaded = Arc::new(Self { manifest, source });
        tracing::info!(source = %loaded.source, rooms = loaded.manifest.rooms.len(), "Capability manifest loaded");

        *MANIFEST_CACHE
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(loaded.clone());
        Ok(loaded)
    }

    /// Wrap an already-built manifest (tests, embedded deployments).
    pub fn from_manifest(manifest: CapabilityManifest, source: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            manifest,
            source: source.into(),
        })
    }

    /// Where this manifest was loaded from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Capabilities for one room, if the manifest knows it.
    pub fn room(&self, room_id: &str) -> Option<&RoomCapabilities> {
        self.manifest.rooms.get(room_id)
    }
}

/// Filters proposed recommendations against one room's real points.
pub struct CapabilityAdapter {
    room_id: String,
    devices: BTreeMap<String, DeviceCapability>,
    /// device_type -> point alias -> spec, for O(1) lookups.
    points: HashMap<String, HashMap<String, PointSpec>>,
    source: String,
}

impl CapabilityAdapter {
    /// Build the adapter for a room.
    ///
    /// A room absent from the manifest is the one fatal condition in the
    /// pipeline: no output can be constructed without knowing the
    /// controllable points.
    pub fn for_room(manifest: &LoadedManifest, room_id: &str) -> Result<Self, AdvisorError> {
        let capabilities = manifest.room(room_id).ok_or_else(|| {
            AdvisorError::ConfigurationFatal(format!(
                "no capability manifest entry for room {}",
                room_id
            ))
        })?;

        let devices: BTreeMap<String, DeviceCapability> = capabilities
            .iter()
            .map(|(device_type, capability)| (device_type.clone(), capability.clone()))
            .collect();
        let points = devices
            .iter()
            .map(|(device_type, capability)| {
                let by_alias = capability
                    .point_list
                    .iter()
                    .map(|spec| (spec.point_alias.clone(), spec.clone()))
                    .collect();
                (device_type.clone(), by_alias)
            })
            .collect();

        Ok(Self {
            room_id: room_id.to_string(),
            devices,
            points,
            source: manifest.source().to_string(),
        })
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Where the capability configuration came from.
    pub fn config_source(&self) -> &str {
        &self.source
    }

    /// Device types this room actually exposes, sorted.
    pub fn supported_device_types(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    /// Controllable point aliases per device type, for prompt composition.
    pub fn device_points(&self) -> BTreeMap<String, Vec<String>> {
        self.devices
            .iter()
            .map(|(device_type, capability)| {
                (
                    device_type.clone(),
                    capability
                        .point_list
                        .iter()
                        .map(|spec| spec.point_alias.clone())
                        .collect(),
                )
            })
            .collect()
    }

    /// Filter one device type's proposed points against the manifest.
    ///
    /// Unknown points are dropped with a warning; an unknown device type
    /// yields an all-filtered result with a warning, not a failure.
    pub fn validate_device_recommendation(
        &self,
        device_type: &str,
        points: &BTreeMap<String, PointAdjustment>,
    ) -> (BTreeMap<String, PointAdjustment>, Vec<String>) {
        let mut warnings = Vec::new();

        let Some(known_points) = self.points.get(device_type) else {
            warnings.push(format!(
                "Unknown device type '{}' for room {}; recommendation dropped",
                device_type, self.room_id
            ));
            return (BTreeMap::new(), warnings);
        };

        let mut filtered = BTreeMap::new();
        for (alias, adjustment) in points {
            let Some(spec) = known_points.get(alias) else {
                warnings.push(format!(
                    "Unknown point '{}' on device type '{}'; dropped",
                    alias, device_type
                ));
                continue;
            };

            let mut adjustment = adjustment.clone();
            adjustment.change_needed =
                spec.change_needed(adjustment.current.as_ref(), &adjustment.recommended);
            if adjustment.action.is_empty() {
                adjustment.action = if adjustment.change_needed {
                    "adjust".to_string()
                } else {
                    "hold".to_string()
                };
            }
            filtered.insert(alias.clone(), adjustment);
        }
        (filtered, warnings)
    }

    /// Adapt a reasoning draft to this room's devices.
    ///
    /// Returns a filtered copy (the draft is never mutated) containing
    /// an entry for every device type in the manifest, so the output
    /// invariant holds even when reasoning proposed nothing usable.
    pub fn adapt_decision_output(
        &self,
        draft: &ReasonedDecision,
    ) -> (BTreeMap<String, DeviceRecommendation>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut adapted: BTreeMap<String, DeviceRecommendation> = BTreeMap::new();

        for (device_type, recommendation) in &draft.device_recommendations {
            let (points, mut point_warnings) =
                self.validate_device_recommendation(device_type, &recommendation.points);
            warnings.append(&mut point_warnings);
            if !self.devices.contains_key(device_type) {
                continue;
            }
            let device_alias = self
                .devices
                .get(device_type)
                .map(|c| c.device_alias.clone())
                .unwrap_or_default();
            adapted.insert(
                device_type.clone(),
                DeviceRecommendation {
                    device_alias,
                    points,
                },
            );
        }

        // The invariant: one entry per manifest device type, always.
        for (device_type, capability) in &self.devices {
            adapted
                .entry(device_type.clone())
                .or_insert_with(|| DeviceRecommendation {
                    device_alias: capability.device_alias.clone(),
                    points: BTreeMap::new(),
                });
        }

        (adapted, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionStatus;
    use crate::error::ReasoningFailure;

    fn manifest_json() -> &'static str {
        r#"{
            "611": {
                "heater": {
                    "device_name": "Room Heater",
                    "device_alias": "heater-1",
                    "point_list": [
                        {"point_alias": "target_temperature", "point_name": "SP01", "remark": "setpoint", "change_type": "analog", "threshold": 0.5},
                        {"point_alias": "mode", "point_name": "MD01", "change_type": "enum", "enum_mapping": {"1": "auto", "2": "manual"}}
                    ]
                },
                "humidifier": {
                    "device_name": "Ultrasonic Humidifier",
                    "device_alias": "hum-1",
                    "point_list": [
                        {"point_alias": "target_humidity", "point_name": "SP02", "change_type": "analog", "threshold": 2.0}
                    ]
                }
            }
        }"#
    }

    fn adapter() -> CapabilityAdapter {
        let manifest: CapabilityManifest = serde_json::from_str(manifest_json()).unwrap();
        let loaded = LoadedManifest::from_manifest(manifest, "test://manifest");
        CapabilityAdapter::for_room(&loaded, "611").unwrap()
    }

    fn analog_spec(threshold: f64) -> PointSpec {
        PointSpec {
            point_alias: "target_temperature".to_string(),
            point_name: "SP01".to_string(),
            remark: None,
            change_type: PointKind::Analog,
            threshold: Some(threshold),
            enum_mapping: None,
        }
    }

    fn enum_spec() -> PointSpec {
        PointSpec {
            point_alias: "mode".to_string(),
            point_name: "MD01".to_string(),
            remark: None,
            change_type: PointKind::Enum,
            threshold: None,
            enum_mapping: Some(HashMap::new()),
        }
    }

    #[test]
    fn analog_change_rule_respects_threshold() {
        let spec = analog_spec(0.5);
        let old = serde_json::json!(18.0);
        assert!(!spec.change_needed(Some(&old), &serde_json::json!(18.4)));
        assert!(spec.change_needed(Some(&old), &serde_json::json!(18.6)));
    }

    #[test]
    fn enum_change_rule_is_inequality() {
        let spec = enum_spec();
        let old = serde_json::json!(1);
        assert!(!spec.change_needed(Some(&old), &serde_json::json!(1)));
        assert!(spec.change_needed(Some(&old), &serde_json::json!(2)));
    }

    #[test]
    fn missing_current_value_assumes_change() {
        assert!(analog_spec(0.5).change_needed(None, &serde_json::json!(18.0)));
        assert!(enum_spec().change_needed(None, &serde_json::json!(1)));
    }

    #[test]
    fn missing_room_is_configuration_fatal() {
        let manifest: CapabilityManifest = serde_json::from_str(manifest_json()).unwrap();
        let loaded = LoadedManifest::from_manifest(manifest, "test://manifest");
        let result = CapabilityAdapter::for_room(&loaded, "612");
        assert!(matches!(result, Err(AdvisorError::ConfigurationFatal(_))));
    }

    #[test]
    fn unknown_points_are_dropped_with_warning() {
        let adapter = adapter();
        let points = BTreeMap::from([
            (
                "target_temperature".to_string(),
                PointAdjustment {
                    current: Some(serde_json::json!(18.0)),
                    recommended: serde_json::json!(19.0),
                    ..Default::default()
                },
            ),
            (
                "laser_power".to_string(),
                PointAdjustment {
                    recommended: serde_json::json!(9000),
                    ..Default::default()
                },
            ),
        ]);

        let (filtered, warnings) = adapter.validate_device_recommendation("heater", &points);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("target_temperature"));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("laser_power"));
    }

    #[test]
    fn unknown_device_type_filters_everything() {
        let adapter = adapter();
        let points = BTreeMap::from([(
            "anything".to_string(),
            PointAdjustment {
                recommended: serde_json::json!(1),
                ..Default::default()
            },
        )]);
        let (filtered, warnings) = adapter.validate_device_recommendation("fog_machine", &points);
        assert!(filtered.is_empty());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("fog_machine"));
    }

    #[test]
    fn adapt_covers_every_manifest_device_type() {
        let adapter = adapter();
        let draft = ReasonedDecision::fallback(ReasoningFailure::Connection("down".to_string()));
        assert_eq!(draft.status, DecisionStatus::Fallback);

        let (adapted, warnings) = adapter.adapt_decision_output(&draft);
        assert!(warnings.is_empty());
        assert_eq!(adapted.len(), 2);
        assert!(adapted.contains_key("heater"));
        assert!(adapted.contains_key("humidifier"));
        assert_eq!(adapted["heater"].device_alias, "heater-1");
    }

    #[test]
    fn adapt_fills_change_flags_and_default_actions() {
        let adapter = adapter();
        let mut draft = ReasonedDecision::fallback(ReasoningFailure::Connection("x".to_string()));
        draft.device_recommendations.insert(
            "heater".to_string(),
            DeviceRecommendation {
                device_alias: String::new(),
                points: BTreeMap::from([(
                    "target_temperature".to_string(),
                    PointAdjustment {
                        current: Some(serde_json::json!(18.0)),
                        recommended: serde_json::json!(18.2),
                        ..Default::default()
                    },
                )]),
            },
        );

        let (adapted, _) = adapter.adapt_decision_output(&draft);
        let point = &adapted["heater"].points["target_temperature"];
        assert!(!point.change_needed);
        assert_eq!(point.action, "hold");
        // The draft itself is untouched.
        assert!(draft.device_recommendations["heater"].points["target_temperature"]
            .action
            .is_empty());
    }
}
