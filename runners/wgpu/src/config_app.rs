//! User-tweakable config for the simulation.
//!
//! Values are always clamped into their declared range, never rejected. Anything interested in
//! changes subscribes with [`ConfigStore::on_change`] and keeps the returned [`Subscription`] alive
//! for as long as it wants to hear about them.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::theme::Theme;

/// Every tweakable parameter
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum Param {
    /// Allocated particles, also the ceiling for the adaptive controller
    ParticleCount,
    /// Let the adaptive controller scale the active particle count
    AdaptiveParticles,
    /// SPH interaction radius, also the spatial bin size
    SphRadius,
    /// SPH rest density
    RestDensity,
    /// Equation of state stiffness
    GasConstant,
    /// Viscosity coefficient
    Viscosity,
    /// Own-ball attraction strength
    AttractorBase,
    /// Own-ball attraction falloff with distance
    AttractorDecay,
    /// Per-step attractor loss outside the tidal radius
    TidalStripping,
    /// Attraction of particles to every other ball
    GravityConstant,
    /// Ball to ball gravitational constant
    BallGravity,
    /// Velocity fraction removed per step
    DragCoefficient,
    /// Velocity kept after a wall bounce
    BounceDamping,
    /// Number of attractor balls
    BallCount,
    /// Fade out and respawn automatically once colours have mixed
    AutoCycle,
    /// Colour variance below which the cycle considers the balls mixed
    HomogeneityThreshold,
    /// Pointer repulsion
    MouseForce,
    /// Particle radius
    ParticleScale,
    /// Renderer: intensity falloff
    IntensityFalloff,
    /// Renderer: intensity floor
    IntensityFloor,
    /// Renderer: brightness falloff
    BrightnessFalloff,
    /// Renderer: brightness floor
    BrightnessFloor,
    /// Renderer: fog intensity
    FogIntensity,
    /// Renderer: fog falloff
    FogFalloff,
    /// Renderer: fog size
    FogSize,
    /// Renderer: glow falloff
    GlowFalloff,
    /// Active theme id
    Theme,
}

/// What kind of value a parameter holds, and its limits
#[derive(Copy, Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ParamKind {
    /// A number clamped into `[min, max]`
    Number {
        /// Value at startup
        default: f32,
        /// Lowest accepted value
        min: f32,
        /// Highest accepted value
        max: f32,
        /// Increment for UI widgets
        step: f32,
        /// Rounded to a whole number on every write
        integer: bool,
    },
    /// An on/off switch
    Flag {
        /// Value at startup
        default: bool,
    },
    /// Free text, only used for the theme id
    Text,
}

/// A parameter's current value
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ParamValue {
    /// Any numeric parameter
    Number(f32),
    /// Switches
    Flag(bool),
    /// The theme id
    Text(String),
}

impl From<f32> for ParamValue {
    #[inline]
    fn from(value: f32) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for ParamValue {
    #[inline]
    #[expect(
        clippy::as_conversions,
        clippy::cast_precision_loss,
        reason = "Config integers are far below f32's exact range"
    )]
    fn from(value: u32) -> Self {
        Self::Number(value as f32)
    }
}

impl From<bool> for ParamValue {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<&str> for ParamValue {
    #[inline]
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Shorthand for a float parameter definition
const fn number(default: f32, min: f32, max: f32, step: f32) -> ParamKind {
    ParamKind::Number {
        default,
        min,
        max,
        step,
        integer: false,
    }
}

/// Shorthand for an integer parameter definition
const fn integer(default: f32, min: f32, max: f32, step: f32) -> ParamKind {
    ParamKind::Number {
        default,
        min,
        max,
        step,
        integer: true,
    }
}

/// The theme selected at startup
pub const DEFAULT_THEME: &str = "nebula";

impl Param {
    /// All parameters in declaration order
    pub const ALL: [Self; 27] = [
        Self::ParticleCount,
        Self::AdaptiveParticles,
        Self::SphRadius,
        Self::RestDensity,
        Self::GasConstant,
        Self::Viscosity,
        Self::AttractorBase,
        Self::AttractorDecay,
        Self::TidalStripping,
        Self::GravityConstant,
        Self::BallGravity,
        Self::DragCoefficient,
        Self::BounceDamping,
        Self::BallCount,
        Self::AutoCycle,
        Self::HomogeneityThreshold,
        Self::MouseForce,
        Self::ParticleScale,
        Self::IntensityFalloff,
        Self::IntensityFloor,
        Self::BrightnessFalloff,
        Self::BrightnessFloor,
        Self::FogIntensity,
        Self::FogFalloff,
        Self::FogSize,
        Self::GlowFalloff,
        Self::Theme,
    ];

    /// Type, default and range of the parameter
    #[must_use]
    #[inline]
    pub const fn kind(self) -> ParamKind {
        match self {
            Self::ParticleCount => integer(50_000.0, 1_000.0, 200_000.0, 1_000.0),
            Self::AdaptiveParticles => ParamKind::Flag { default: false },
            Self::SphRadius => number(25.0, 5.0, 100.0, 1.0),
            Self::RestDensity => number(1.0, 0.1, 5.0, 0.1),
            Self::GasConstant => number(200.0, 10.0, 2000.0, 10.0),
            Self::Viscosity => number(50.0, 0.0, 500.0, 5.0),
            Self::AttractorBase => number(800.0, 0.0, 2000.0, 10.0),
            Self::AttractorDecay => number(0.005, 0.0, 0.1, 0.001),
            Self::TidalStripping => number(0.002, 0.0, 0.01, 0.0005),
            Self::GravityConstant => number(100.0, 0.0, 1000.0, 10.0),
            Self::BallGravity => number(400.0, 0.0, 5000.0, 50.0),
            Self::DragCoefficient => number(0.01, 0.0, 0.1, 0.005),
            Self::BounceDamping => number(0.7, 0.1, 1.0, 0.05),
            Self::BallCount => integer(3.0, 2.0, 5.0, 1.0),
            Self::AutoCycle => ParamKind::Flag { default: true },
            Self::HomogeneityThreshold => number(0.05, 0.01, 0.2, 0.01),
            Self::MouseForce => number(0.0, 0.0, 500.0, 10.0),
            Self::ParticleScale => number(1.0, 0.1, 5.0, 0.1),
            Self::IntensityFalloff | Self::BrightnessFalloff => number(1.5, 0.0, 5.0, 0.1),
            Self::IntensityFloor => number(0.03, 0.01, 0.5, 0.01),
            Self::BrightnessFloor => number(0.05, 0.01, 0.5, 0.01),
            Self::FogIntensity => number(0.15, 0.0, 1.0, 0.01),
            Self::FogFalloff => number(4.0, 0.5, 10.0, 0.5),
            Self::FogSize => number(2.5, 1.0, 8.0, 0.5),
            Self::GlowFalloff => number(2.5, 0.5, 8.0, 0.1),
            Self::Theme => ParamKind::Text,
        }
    }

    /// Whether applying a theme overwrites this parameter
    #[must_use]
    #[inline]
    pub const fn is_theme_owned(self) -> bool {
        !matches!(
            self,
            Self::ParticleCount
                | Self::AdaptiveParticles
                | Self::AutoCycle
                | Self::HomogeneityThreshold
                | Self::MouseForce
                | Self::Theme
        )
    }

    /// The value a fresh store starts with
    #[must_use]
    #[inline]
    pub fn default_value(self) -> ParamValue {
        match self.kind() {
            ParamKind::Number { default, .. } => ParamValue::Number(default),
            ParamKind::Flag { default } => ParamValue::Flag(default),
            ParamKind::Text => ParamValue::Text(DEFAULT_THEME.to_owned()),
        }
    }

    /// Fit a value to this parameter's kind. Numbers are clamped and, for integer parameters,
    /// rounded. Returns `None` when the value is of the wrong kind entirely.
    #[must_use]
    #[inline]
    pub fn sanitise(self, value: ParamValue) -> Option<ParamValue> {
        match (self.kind(), value) {
            (
                ParamKind::Number {
                    min, max, integer, ..
                },
                ParamValue::Number(number),
            ) => {
                if number.is_nan() {
                    return None;
                }
                let clamped = number.clamp(min, max);
                Some(ParamValue::Number(if integer {
                    clamped.round()
                } else {
                    clamped
                }))
            }
            (ParamKind::Flag { .. }, ParamValue::Flag(flag)) => Some(ParamValue::Flag(flag)),
            (ParamKind::Text, ParamValue::Text(text)) => Some(ParamValue::Text(text)),
            _ => None,
        }
    }
}

/// Callback signature for change notifications: `(param, new, old)`
pub type Listener = dyn FnMut(Param, &ParamValue, &ParamValue);

/// Registered listeners, keyed by subscription id
type ListenerList = RefCell<Vec<(u64, Rc<RefCell<Listener>>)>>;

/// Handle returned by [`ConfigStore::on_change`]. Dropping it, or calling
/// [`Subscription::unsubscribe`], removes the listener.
#[must_use = "The listener is removed as soon as the subscription is dropped"]
pub struct Subscription {
    /// Which listener to remove
    id: u64,
    /// The store's listener list. Weak so a subscription can outlive its store.
    listeners: Weak<ListenerList>,
}

impl Subscription {
    /// Stop receiving notifications
    #[inline]
    pub fn unsubscribe(self) {
        // Removal happens in `Drop`
    }
}

impl Drop for Subscription {
    #[inline]
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.borrow_mut().retain(|(id, _)| *id != self.id);
        }
    }
}

/// The single source of truth for tweakable parameters
pub struct ConfigStore {
    /// Current values
    values: BTreeMap<Param, ParamValue>,
    /// Change listeners
    listeners: Rc<ListenerList>,
    /// Next subscription id
    next_id: u64,
}

impl Default for ConfigStore {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    /// A store holding every parameter's default
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self {
            values: Param::ALL
                .iter()
                .map(|param| (*param, param.default_value()))
                .collect(),
            listeners: Rc::default(),
            next_id: 0,
        }
    }

    /// Current value of a parameter
    #[must_use]
    #[inline]
    pub fn get(&self, param: Param) -> ParamValue {
        self.values
            .get(&param)
            .cloned()
            .unwrap_or_else(|| param.default_value())
    }

    /// Current value of a numeric parameter. Non-numeric parameters read as zero.
    #[must_use]
    #[inline]
    pub fn number(&self, param: Param) -> f32 {
        match self.values.get(&param) {
            Some(ParamValue::Number(number)) => *number,
            _ => 0.0,
        }
    }

    /// Current value of an integer parameter
    #[must_use]
    #[inline]
    #[expect(
        clippy::as_conversions,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "Integer params are rounded and clamped to small positive ranges on write"
    )]
    pub fn integer(&self, param: Param) -> u32 {
        self.number(param) as u32
    }

    /// Current value of a switch
    #[must_use]
    #[inline]
    pub fn flag(&self, param: Param) -> bool {
        matches!(self.values.get(&param), Some(ParamValue::Flag(true)))
    }

    /// The active theme id
    #[must_use]
    #[inline]
    pub fn theme_id(&self) -> String {
        match self.values.get(&Param::Theme) {
            Some(ParamValue::Text(id)) => id.clone(),
            _ => DEFAULT_THEME.to_owned(),
        }
    }

    /// Write a parameter. Out-of-range numbers are clamped, writes of the current value are
    /// ignored. Returns whether the value changed, in which case every listener has been called.
    #[inline]
    pub fn set<V: Into<ParamValue>>(&mut self, param: Param, value: V) -> bool {
        let requested = value.into();
        let Some(value) = param.sanitise(requested.clone()) else {
            log::warn!("Ignoring {requested:?} for {param:?}: wrong kind of value");
            return false;
        };
        if value != requested {
            log::debug!("Clamped {param:?} from {requested:?} to {value:?}");
        }

        let old = self.get(param);
        if old == value {
            return false;
        }
        self.values.insert(param, value.clone());
        self.notify(param, &value, &old);
        true
    }

    /// Call every listener. The list is cloned first so listeners may unsubscribe while being
    /// notified.
    fn notify(&self, param: Param, value: &ParamValue, old: &ParamValue) {
        let listeners: Vec<Rc<RefCell<Listener>>> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            if let Ok(mut callback) = listener.try_borrow_mut() {
                (*callback)(param, value, old);
            }
        }
    }

    /// Register a change listener
    #[inline]
    pub fn on_change<F>(&mut self, callback: F) -> Subscription
    where
        F: FnMut(Param, &ParamValue, &ParamValue) + 'static,
    {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let listener: Rc<RefCell<Listener>> = Rc::new(RefCell::new(callback));
        self.listeners.borrow_mut().push((id, listener));
        Subscription {
            id,
            listeners: Rc::downgrade(&self.listeners),
        }
    }

    /// Number of live subscriptions
    #[must_use]
    #[inline]
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Overwrite every theme-owned parameter with the theme's values, then record the theme id.
    #[inline]
    pub fn apply_theme(&mut self, theme: &Theme) {
        for (param, value) in theme.param_values() {
            if param.is_theme_owned() {
                self.set(param, value);
            }
        }
        self.set(Param::Theme, theme.id.as_str());
    }

    /// Plain copy of all current values
    #[must_use]
    #[inline]
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            particle_count: self.integer(Param::ParticleCount),
            adaptive_particles: self.flag(Param::AdaptiveParticles),
            sph_radius: self.number(Param::SphRadius),
            rest_density: self.number(Param::RestDensity),
            gas_constant: self.number(Param::GasConstant),
            viscosity: self.number(Param::Viscosity),
            attractor_base: self.number(Param::AttractorBase),
            attractor_decay: self.number(Param::AttractorDecay),
            tidal_stripping: self.number(Param::TidalStripping),
            gravity_constant: self.number(Param::GravityConstant),
            ball_gravity: self.number(Param::BallGravity),
            drag_coefficient: self.number(Param::DragCoefficient),
            bounce_damping: self.number(Param::BounceDamping),
            ball_count: self.integer(Param::BallCount),
            auto_cycle: self.flag(Param::AutoCycle),
            homogeneity_threshold: self.number(Param::HomogeneityThreshold),
            mouse_force: self.number(Param::MouseForce),
            particle_scale: self.number(Param::ParticleScale),
            intensity_falloff: self.number(Param::IntensityFalloff),
            intensity_floor: self.number(Param::IntensityFloor),
            brightness_falloff: self.number(Param::BrightnessFalloff),
            brightness_floor: self.number(Param::BrightnessFloor),
            fog_intensity: self.number(Param::FogIntensity),
            fog_falloff: self.number(Param::FogFalloff),
            fog_size: self.number(Param::FogSize),
            glow_falloff: self.number(Param::GlowFalloff),
            theme: self.theme_id(),
        }
    }
}

/// A typed copy of every parameter, taken once per step
#[derive(Clone, Debug, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "Mirrors `Param` one to one")]
#[expect(clippy::struct_excessive_bools, reason = "They're independent switches")]
pub struct ConfigSnapshot {
    /// See [`Param::ParticleCount`]
    pub particle_count: u32,
    /// See [`Param::AdaptiveParticles`]
    pub adaptive_particles: bool,
    /// See [`Param::SphRadius`]
    pub sph_radius: f32,
    /// See [`Param::RestDensity`]
    pub rest_density: f32,
    /// See [`Param::GasConstant`]
    pub gas_constant: f32,
    /// See [`Param::Viscosity`]
    pub viscosity: f32,
    /// See [`Param::AttractorBase`]
    pub attractor_base: f32,
    /// See [`Param::AttractorDecay`]
    pub attractor_decay: f32,
    /// See [`Param::TidalStripping`]
    pub tidal_stripping: f32,
    /// See [`Param::GravityConstant`]
    pub gravity_constant: f32,
    /// See [`Param::BallGravity`]
    pub ball_gravity: f32,
    /// See [`Param::DragCoefficient`]
    pub drag_coefficient: f32,
    /// See [`Param::BounceDamping`]
    pub bounce_damping: f32,
    /// See [`Param::BallCount`]
    pub ball_count: u32,
    /// See [`Param::AutoCycle`]
    pub auto_cycle: bool,
    /// See [`Param::HomogeneityThreshold`]
    pub homogeneity_threshold: f32,
    /// See [`Param::MouseForce`]
    pub mouse_force: f32,
    /// See [`Param::ParticleScale`]
    pub particle_scale: f32,
    /// See [`Param::IntensityFalloff`]
    pub intensity_falloff: f32,
    /// See [`Param::IntensityFloor`]
    pub intensity_floor: f32,
    /// See [`Param::BrightnessFalloff`]
    pub brightness_falloff: f32,
    /// See [`Param::BrightnessFloor`]
    pub brightness_floor: f32,
    /// See [`Param::FogIntensity`]
    pub fog_intensity: f32,
    /// See [`Param::FogFalloff`]
    pub fog_falloff: f32,
    /// See [`Param::FogSize`]
    pub fog_size: f32,
    /// See [`Param::GlowFalloff`]
    pub glow_falloff: f32,
    /// See [`Param::Theme`]
    pub theme: String,
}

impl Default for ConfigSnapshot {
    #[inline]
    fn default() -> Self {
        ConfigStore::new().snapshot()
    }
}
