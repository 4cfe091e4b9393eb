//! Themes bundle a colour palette with physics, visual and cycle defaults.
//!
//! There is no ambient "active theme". Whoever needs one is handed a `&Theme`.

use crate::config_app::{Param, ParamValue};
use crate::error::SimulationError;

/// Physics defaults a theme imposes
#[derive(Copy, Clone, Debug, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "Plain data")]
pub struct PhysicsDefaults {
    /// SPH interaction radius
    pub sph_radius: f32,
    /// SPH rest density
    pub rest_density: f32,
    /// Equation of state stiffness
    pub gas_constant: f32,
    /// Viscosity
    pub viscosity: f32,
    /// Own-ball attraction
    pub attractor_base: f32,
    /// Own-ball attraction falloff
    pub attractor_decay: f32,
    /// Tidal stripping rate
    pub tidal_stripping: f32,
    /// Particle gravity toward other balls
    pub gravity_constant: f32,
    /// Ball to ball gravity
    pub ball_gravity: f32,
    /// Drag
    pub drag_coefficient: f32,
    /// Wall bounce damping
    pub bounce_damping: f32,
}

/// Shaping values only the renderer reads
#[derive(Copy, Clone, Debug, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "Plain data")]
pub struct VisualDefaults {
    /// Particle radius
    pub particle_scale: f32,
    /// Intensity falloff
    pub intensity_falloff: f32,
    /// Intensity floor
    pub intensity_floor: f32,
    /// Brightness falloff
    pub brightness_falloff: f32,
    /// Brightness floor
    pub brightness_floor: f32,
    /// Fog intensity
    pub fog_intensity: f32,
    /// Fog falloff
    pub fog_falloff: f32,
    /// Fog size
    pub fog_size: f32,
    /// Glow falloff
    pub glow_falloff: f32,
}

/// Durations driving the spawn/active/fade cycle, in seconds
#[derive(Copy, Clone, Debug, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "Plain data")]
pub struct CycleTiming {
    /// Linear fade in after a respawn
    pub fade_in: f32,
    /// Linear fade out before a respawn
    pub fade_out: f32,
    /// Minimum time in ACTIVE before mixing can end the cycle
    pub min_active: f32,
    /// Number of balls the theme spawns
    pub ball_count: u32,
}

/// Backdrop values for the renderer
#[derive(Copy, Clone, Debug, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "Plain data")]
pub struct BackgroundDefaults {
    /// Clear colour
    pub clear_color: [f32; 4],
    /// Fraction of pixels that are stars
    pub star_density: f32,
    /// Star brightness
    pub star_brightness: f32,
    /// Ambient nebula glow
    pub nebula_glow: f32,
}

/// A complete look and feel
#[derive(Clone, Debug, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "Plain data")]
pub struct Theme {
    /// Lookup key, also stored in `Param::Theme`
    pub id: String,
    /// Human readable name
    pub name: String,
    /// Ball colours. Balls never share a colour while there are at least as many colours as balls.
    pub palette: Vec<[f32; 3]>,
    /// Physics defaults
    pub physics: PhysicsDefaults,
    /// Renderer defaults
    pub visual: VisualDefaults,
    /// Cycle timings
    pub cycle: CycleTiming,
    /// Renderer backdrop
    pub background: BackgroundDefaults,
}

impl Theme {
    /// Luminous gas clouds on a starfield
    #[must_use]
    #[inline]
    pub fn nebula() -> Self {
        Self {
            id: "nebula".to_owned(),
            name: "Nebula".to_owned(),
            palette: vec![
                [0.9, 0.2, 0.4], // Ruby
                [0.2, 0.4, 0.9], // Sapphire
                [0.1, 0.8, 0.5], // Emerald
                [0.8, 0.3, 0.9], // Amethyst
                [0.9, 0.7, 0.1], // Topaz
                [0.1, 0.7, 0.9], // Aquamarine
            ],
            physics: PhysicsDefaults {
                sph_radius: 25.0,
                rest_density: 1.0,
                gas_constant: 200.0,
                viscosity: 50.0,
                attractor_base: 800.0,
                attractor_decay: 0.005,
                tidal_stripping: 0.002,
                gravity_constant: 100.0,
                ball_gravity: 400.0,
                drag_coefficient: 0.01,
                bounce_damping: 0.7,
            },
            visual: VisualDefaults {
                particle_scale: 1.0,
                intensity_falloff: 1.5,
                intensity_floor: 0.03,
                brightness_falloff: 1.5,
                brightness_floor: 0.05,
                fog_intensity: 0.15,
                fog_falloff: 4.0,
                fog_size: 2.5,
                glow_falloff: 2.5,
            },
            cycle: CycleTiming {
                fade_in: 2.0,
                fade_out: 3.0,
                min_active: 10.0,
                ball_count: 3,
            },
            background: BackgroundDefaults {
                clear_color: [0.01, 0.005, 0.02, 1.0],
                star_density: 0.003,
                star_brightness: 0.8,
                nebula_glow: 0.15,
            },
        }
    }

    /// Thick ink diffusing through water
    #[must_use]
    #[inline]
    pub fn inky() -> Self {
        Self {
            id: "inky".to_owned(),
            name: "Inky".to_owned(),
            palette: vec![
                [0.05, 0.1, 0.35],  // Indigo
                [0.45, 0.05, 0.1],  // Oxblood
                [0.05, 0.3, 0.2],   // Viridian
                [0.3, 0.2, 0.05],   // Sepia
                [0.25, 0.05, 0.35], // Aubergine
            ],
            physics: PhysicsDefaults {
                sph_radius: 20.0,
                rest_density: 1.5,
                gas_constant: 120.0,
                viscosity: 180.0,
                attractor_base: 600.0,
                attractor_decay: 0.01,
                tidal_stripping: 0.004,
                gravity_constant: 60.0,
                ball_gravity: 250.0,
                drag_coefficient: 0.03,
                bounce_damping: 0.5,
            },
            visual: VisualDefaults {
                particle_scale: 1.5,
                intensity_falloff: 1.0,
                intensity_floor: 0.1,
                brightness_falloff: 1.0,
                brightness_floor: 0.1,
                fog_intensity: 0.4,
                fog_falloff: 2.0,
                fog_size: 4.0,
                glow_falloff: 1.5,
            },
            cycle: CycleTiming {
                fade_in: 3.0,
                fade_out: 4.0,
                min_active: 15.0,
                ball_count: 4,
            },
            background: BackgroundDefaults {
                clear_color: [0.95, 0.93, 0.88, 1.0],
                star_density: 0.0,
                star_brightness: 0.0,
                nebula_glow: 0.0,
            },
        }
    }

    /// Every theme-owned parameter paired with this theme's value for it
    #[must_use]
    #[inline]
    pub fn param_values(&self) -> Vec<(Param, ParamValue)> {
        let physics = &self.physics;
        let visual = &self.visual;
        vec![
            (Param::SphRadius, physics.sph_radius.into()),
            (Param::RestDensity, physics.rest_density.into()),
            (Param::GasConstant, physics.gas_constant.into()),
            (Param::Viscosity, physics.viscosity.into()),
            (Param::AttractorBase, physics.attractor_base.into()),
            (Param::AttractorDecay, physics.attractor_decay.into()),
            (Param::TidalStripping, physics.tidal_stripping.into()),
            (Param::GravityConstant, physics.gravity_constant.into()),
            (Param::BallGravity, physics.ball_gravity.into()),
            (Param::DragCoefficient, physics.drag_coefficient.into()),
            (Param::BounceDamping, physics.bounce_damping.into()),
            (Param::ParticleScale, visual.particle_scale.into()),
            (Param::IntensityFalloff, visual.intensity_falloff.into()),
            (Param::IntensityFloor, visual.intensity_floor.into()),
            (Param::BrightnessFalloff, visual.brightness_falloff.into()),
            (Param::BrightnessFloor, visual.brightness_floor.into()),
            (Param::FogIntensity, visual.fog_intensity.into()),
            (Param::FogFalloff, visual.fog_falloff.into()),
            (Param::FogSize, visual.fog_size.into()),
            (Param::GlowFalloff, visual.glow_falloff.into()),
            (Param::BallCount, self.cycle.ball_count.into()),
        ]
    }
}

/// Every known theme, by id
#[derive(Clone, Debug, Default)]
pub struct ThemeRegistry {
    /// Themes in registration order
    themes: Vec<Theme>,
}

impl ThemeRegistry {
    /// The themes that ship with the simulation
    #[must_use]
    #[inline]
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.register(Theme::nebula());
        registry.register(Theme::inky());
        registry
    }

    /// Add a theme, replacing any theme with the same id
    #[inline]
    pub fn register(&mut self, theme: Theme) {
        self.themes.retain(|existing| existing.id != theme.id);
        self.themes.push(theme);
    }

    /// Look up a theme
    ///
    /// # Errors
    /// When no theme has that id
    #[inline]
    pub fn get(&self, id: &str) -> Result<&Theme, SimulationError> {
        self.themes
            .iter()
            .find(|theme| theme.id == id)
            .ok_or_else(|| SimulationError::UnknownTheme(id.to_owned()))
    }

    /// All registered ids
    #[must_use]
    #[inline]
    pub fn ids(&self) -> Vec<&str> {
        self.themes.iter().map(|theme| theme.id.as_str()).collect()
    }
}
