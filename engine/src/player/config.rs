//! Movement Configuration
//!
//! Every tunable the movement extension reads lives in [`MovementConfig`].
//! Collision tolerances that a game would otherwise expose as global console
//! variables are grouped in [`CollisionTolerances`] and handed by value to the
//! height engine and the prone mover.
//!
//! # Loading
//!
//! ```rust,ignore
//! use stance_movement::player::MovementConfig;
//!
//! let config = MovementConfig::load("movement.json")?;
//! // Missing fields take their defaults
//! let config = MovementConfig::from_json_str(r#"{ "crouch_time": 0.5 }"#)?;
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::state::{Posture, TransitionState};

/// Cosine threshold of the loose sprint alignment gate.
pub const LOOSE_SPRINT_COSINE: f32 = 0.2;

/// Cosine threshold of the strict sprint alignment gate (about 45 degrees).
pub const STRICT_SPRINT_COSINE: f32 = 0.7071;

// ============================================================================
// ERRORS
// ============================================================================

/// Errors from loading or validating a configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Reading the file failed.
    IoError(std::io::Error),
    /// The JSON could not be parsed.
    JsonError(serde_json::Error),
    /// A value is out of range.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::JsonError(e) => write!(f, "JSON error: {e}"),
            ConfigError::Invalid(reason) => write!(f, "invalid movement config: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::JsonError(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::IoError(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::JsonError(e)
    }
}

// ============================================================================
// POLICIES
// ============================================================================

/// When height changes are written to the collision capsule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightCommitPolicy {
    /// Interpolate a virtual height and resize the capsule once, when the
    /// transition completes (growth is committed when it starts).
    #[default]
    Discrete,
    /// Resize the capsule to the interpolated height every tick.
    Continuous,
}

/// How closely acceleration must follow the facing direction to sprint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SprintAlignment {
    /// Cosine of at least 0.2
    Loose,
    /// Cosine of at least 0.7071
    #[default]
    Strict,
    /// Explicit minimum cosine
    Custom(f32),
}

impl SprintAlignment {
    /// Minimum cosine between facing and acceleration.
    pub fn min_cosine(self) -> f32 {
        match self {
            SprintAlignment::Loose => LOOSE_SPRINT_COSINE,
            SprintAlignment::Strict => STRICT_SPRINT_COSINE,
            SprintAlignment::Custom(cosine) => cosine,
        }
    }

    /// Whether `cosine` passes the gate.
    pub fn is_aligned(self, cosine: f32) -> bool {
        cosine >= self.min_cosine()
    }
}

/// Piecewise-linear curve keyed on a speed ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedCurve {
    /// (input, output) keys, sorted by input
    pub keys: Vec<(f32, f32)>,
}

impl Default for SpeedCurve {
    fn default() -> Self {
        // Strong push off the line, tapering to plain acceleration at top speed
        Self {
            keys: vec![(0.0, 1.5), (0.5, 1.25), (1.0, 1.0)],
        }
    }
}

impl SpeedCurve {
    /// Flat curve returning `value` everywhere.
    pub fn constant(value: f32) -> Self {
        Self {
            keys: vec![(0.0, value)],
        }
    }

    /// Evaluate the curve, clamping outside the key range. An empty curve
    /// evaluates to 1.0.
    pub fn evaluate(&self, input: f32) -> f32 {
        let (Some(first), Some(last)) = (self.keys.first(), self.keys.last()) else {
            return 1.0;
        };
        if input <= first.0 {
            return first.1;
        }
        if input >= last.0 {
            return last.1;
        }
        for pair in self.keys.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            if input <= x1 {
                let span = x1 - x0;
                if span <= f32::EPSILON {
                    return y1;
                }
                return y0 + (y1 - y0) * (input - x0) / span;
            }
        }
        last.1
    }
}

/// Collision tolerances shared by the height engine and the prone mover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionTolerances {
    /// Dot product above which a start-penetrating contact the move is
    /// leaving gets ignored
    pub initial_overlap_tolerance: f32,
    /// Inflation applied to the overlap test that precedes a penetration
    /// teleport
    pub penetration_overlap_check_inflation: f32,
    /// Allow the first blocking overlap of a guarded move to be ignored
    pub move_ignore_first_blocking_overlap: bool,
}

impl Default for CollisionTolerances {
    fn default() -> Self {
        Self {
            initial_overlap_tolerance: 0.0,
            penetration_overlap_check_inflation: 0.1,
            move_ignore_first_blocking_overlap: false,
        }
    }
}

// ============================================================================
// MOVEMENT CONFIG
// ============================================================================

/// Tunables for sprint, crouch and prone movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    // Capsule
    pub capsule_radius: f32,
    pub standing_half_height: f32,
    pub crouched_half_height: f32,
    pub prone_half_height: f32,
    /// Keep the capsule base on the floor while the height changes
    pub crouch_maintains_base_location: bool,

    // Timing, seconds for a full standing <-> crouched (or prone) change
    pub crouch_time: f32,
    pub prone_time: f32,

    // Eye heights above the capsule centre
    pub standing_eye_height: f32,
    pub crouched_eye_height: f32,
    pub prone_eye_height: f32,

    // Policies
    pub commit_policy: HeightCommitPolicy,
    pub sprint_alignment: SprintAlignment,

    // Capabilities
    pub can_crouch: bool,
    pub can_sprint: bool,
    pub can_ever_prone: bool,

    // Speeds
    pub max_walk_speed: f32,
    pub max_walk_speed_crouched: f32,
    pub max_walk_speed_prone: f32,
    pub max_sprint_speed: f32,
    pub max_acceleration: f32,
    pub braking_deceleration_walking: f32,
    pub ground_friction: f32,
    pub sprint_acceleration_curve: SpeedCurve,

    // Simulation loop
    pub max_simulation_iterations: u32,
    pub min_tick_time: f32,
    /// Minimum normal Y component of a walkable surface
    pub walkable_floor_y: f32,
    /// Yaw rotation rate in degrees per second
    pub rotation_rate_yaw: f32,

    pub tolerances: CollisionTolerances,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            capsule_radius: 34.0,
            standing_half_height: 88.0,
            crouched_half_height: 60.0,
            prone_half_height: 34.0,
            crouch_maintains_base_location: true,

            crouch_time: 2.0,
            prone_time: 2.0,

            standing_eye_height: 64.0,
            crouched_eye_height: 50.0,
            prone_eye_height: 20.0,

            commit_policy: HeightCommitPolicy::Discrete,
            sprint_alignment: SprintAlignment::Strict,

            can_crouch: true,
            can_sprint: true,
            can_ever_prone: true,

            max_walk_speed: 600.0,
            max_walk_speed_crouched: 300.0,
            max_walk_speed_prone: 300.0,
            max_sprint_speed: 800.0,
            max_acceleration: 2048.0,
            braking_deceleration_walking: 2048.0,
            ground_friction: 8.0,
            sprint_acceleration_curve: SpeedCurve::default(),

            max_simulation_iterations: 8,
            min_tick_time: 0.0002,
            walkable_floor_y: 0.71,
            rotation_rate_yaw: 360.0,

            tolerances: CollisionTolerances::default(),
        }
    }
}

impl MovementConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: MovementConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject values the movement code cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capsule_radius <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "capsule_radius must be positive, got {}",
                self.capsule_radius
            )));
        }
        if self.standing_half_height < self.capsule_radius {
            return Err(ConfigError::Invalid(
                "standing_half_height is below capsule_radius".to_string(),
            ));
        }
        for (name, value) in [
            ("crouched_half_height", self.crouched_half_height),
            ("prone_half_height", self.prone_half_height),
        ] {
            if value < self.capsule_radius || value > self.standing_half_height {
                return Err(ConfigError::Invalid(format!(
                    "{name} {value} must lie between capsule_radius and standing_half_height"
                )));
            }
        }
        if self.prone_half_height > self.crouched_half_height {
            return Err(ConfigError::Invalid(
                "prone_half_height is above crouched_half_height".to_string(),
            ));
        }
        if self.crouch_time < 0.0 || self.prone_time < 0.0 {
            return Err(ConfigError::Invalid("transition times cannot be negative".to_string()));
        }
        let cosine = self.sprint_alignment.min_cosine();
        if !(-1.0..=1.0).contains(&cosine) {
            return Err(ConfigError::Invalid(format!(
                "sprint alignment cosine {cosine} is outside [-1, 1]"
            )));
        }
        if self.max_simulation_iterations == 0 {
            return Err(ConfigError::Invalid(
                "max_simulation_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Unscaled capsule half-height of a posture.
    pub fn half_height_for(&self, posture: Posture) -> f32 {
        match posture {
            Posture::Standing => self.standing_half_height,
            Posture::Crouched => self.crouched_half_height,
            Posture::Prone => self.prone_half_height,
        }
    }

    /// Time to travel the full height span of a leg.
    fn leg_time(&self, involves_prone: bool) -> f32 {
        if involves_prone { self.prone_time } else { self.crouch_time }
    }

    /// Half-height change per second for `transition` at `current_half_height`.
    ///
    /// Depends only on the replicated pair so a restored move advances at the
    /// same speed on every instance. Anything below the crouched height moves
    /// on the prone leg. The rate spans the full standing-to-lowest distance
    /// of the leg, so a reversal midway keeps the same speed.
    pub fn transition_rate(&self, transition: TransitionState, current_half_height: f32) -> f32 {
        let involves_prone = matches!(transition, TransitionState::ToProne | TransitionState::ProneToCrouch)
            || current_half_height < self.crouched_half_height;
        let low = if involves_prone { self.prone_half_height } else { self.crouched_half_height };
        let time = self.leg_time(involves_prone);
        if time <= 0.0 {
            return f32::INFINITY;
        }
        (self.standing_half_height - low) / time
    }

    /// Eye height for a capsule half-height, interpolated linearly between
    /// the prone, crouched and standing eye heights.
    pub fn eye_height_for_half_height(&self, half_height: f32) -> f32 {
        let lerp_span = |h0: f32, e0: f32, h1: f32, e1: f32| {
            let span = h1 - h0;
            if span.abs() <= f32::EPSILON {
                return e1;
            }
            let alpha = ((half_height - h0) / span).clamp(0.0, 1.0);
            e0 + (e1 - e0) * alpha
        };
        if half_height >= self.crouched_half_height {
            lerp_span(
                self.crouched_half_height,
                self.crouched_eye_height,
                self.standing_half_height,
                self.standing_eye_height,
            )
        } else {
            lerp_span(
                self.prone_half_height,
                self.prone_eye_height,
                self.crouched_half_height,
                self.crouched_eye_height,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.001;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(MovementConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = MovementConfig::from_json_str(r#"{ "crouch_time": 0.5, "commit_policy": "continuous" }"#)
            .expect("valid json");
        assert!(approx_eq(config.crouch_time, 0.5));
        assert_eq!(config.commit_policy, HeightCommitPolicy::Continuous);
        assert!(approx_eq(config.standing_half_height, 88.0));
        assert!(approx_eq(config.tolerances.penetration_overlap_check_inflation, 0.1));
    }

    #[test]
    fn test_sprint_alignment_from_json() {
        let config = MovementConfig::from_json_str(r#"{ "sprint_alignment": { "custom": 0.5 } }"#).expect("valid json");
        assert_eq!(config.sprint_alignment, SprintAlignment::Custom(0.5));
        let config = MovementConfig::from_json_str(r#"{ "sprint_alignment": "loose" }"#).expect("valid json");
        assert!(approx_eq(config.sprint_alignment.min_cosine(), 0.2));
    }

    #[test]
    fn test_invalid_heights_rejected() {
        let result = MovementConfig::from_json_str(r#"{ "crouched_half_height": 10.0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = MovementConfig::from_json_str(r#"{ "prone_half_height": 70.0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        let result = MovementConfig::from_json_str("{ not json");
        match result {
            Err(ConfigError::JsonError(_)) => {}
            other => panic!("expected JsonError, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = MovementConfig::load("/definitely/not/here/movement.json");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_alignment_gate_is_inclusive() {
        assert!(SprintAlignment::Strict.is_aligned(0.7071));
        assert!(!SprintAlignment::Strict.is_aligned(0.7070));
        assert!(SprintAlignment::Loose.is_aligned(0.2));
        assert!(!SprintAlignment::Loose.is_aligned(0.19));
    }

    #[test]
    fn test_transition_rate() {
        let config = MovementConfig::default();
        assert!(approx_eq(config.transition_rate(TransitionState::StandToCrouch, 88.0), 14.0));
        assert!(approx_eq(config.transition_rate(TransitionState::ToProne, 60.0), 27.0));
        assert!(approx_eq(config.transition_rate(TransitionState::ProneToCrouch, 40.0), 27.0));
        // Standing up from below the crouched height stays on the prone leg
        assert!(approx_eq(config.transition_rate(TransitionState::CrouchToStand, 50.0), 27.0));
        assert!(approx_eq(config.transition_rate(TransitionState::CrouchToStand, 70.0), 14.0));
    }

    #[test]
    fn test_eye_height_interpolation() {
        let config = MovementConfig::default();
        assert!(approx_eq(config.eye_height_for_half_height(88.0), 64.0));
        assert!(approx_eq(config.eye_height_for_half_height(60.0), 50.0));
        assert!(approx_eq(config.eye_height_for_half_height(74.0), 57.0));
        assert!(approx_eq(config.eye_height_for_half_height(34.0), 20.0));
    }

    #[test]
    fn test_speed_curve_evaluation() {
        let curve = SpeedCurve::default();
        assert!(approx_eq(curve.evaluate(-1.0), 1.5));
        assert!(approx_eq(curve.evaluate(0.25), 1.375));
        assert!(approx_eq(curve.evaluate(2.0), 1.0));
        assert!(approx_eq(SpeedCurve { keys: Vec::new() }.evaluate(0.3), 1.0));
        assert!(approx_eq(SpeedCurve::constant(2.0).evaluate(0.3), 2.0));
    }
}
