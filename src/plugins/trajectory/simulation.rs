//! Projectile path prediction.
//!
//! The path is stepped at a fixed rate along the closed form parabola, and every step is swept
//! against the world with the projectile shape. A hit bounces the projectile off the impact point,
//! and the simulation restarts from there with the reflected velocity.

use bevy::prelude::*;

use crate::plugins::config::{ProjectileConfig, TrajectoryConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySettings {
    /// Simulated time budget, counted from the launch or from the last bounce.
    pub max_sim_time: f32,
    pub max_bounces: u32,
    pub step: f32,
    /// Where the clock restarts after a bounce, so the next sweep does not start on the surface.
    pub bounce_epsilon: f32,
}

impl Default for TrajectorySettings {
    fn default() -> Self {
        TrajectorySettings {
            max_sim_time: 2.,
            max_bounces: 2,
            step: 0.01,
            bounce_epsilon: 0.0005,
        }
    }
}

impl From<&TrajectoryConfig> for TrajectorySettings {
    fn from(config: &TrajectoryConfig) -> Self {
        TrajectorySettings {
            max_sim_time: config.max_sim_time,
            max_bounces: config.max_bounces,
            step: config.step,
            bounce_epsilon: config.bounce_epsilon,
        }
    }
}

/// Physical properties of the simulated projectile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectileBody {
    pub radius: f32,
    pub friction: f32,
    pub bounciness: f32,
}

impl From<&ProjectileConfig> for ProjectileBody {
    fn from(config: &ProjectileConfig) -> Self {
        ProjectileBody {
            radius: config.radius,
            friction: config.friction,
            bounciness: config.bounciness,
        }
    }
}

/// First blocking hit of a swept sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepHit {
    /// Center of the sphere when it touches the obstacle.
    pub location: Vec3,
    pub normal: Vec3,
    /// How far along the swept segment the hit happened, between 0 and 1.
    pub fraction: f32,
}

pub trait ShapeSweep {
    fn sweep_sphere(&self, radius: f32, from: Vec3, to: Vec3) -> Option<SweepHit>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSegment {
    pub start: Vec3,
    pub end: Vec3,
    pub start_tangent: Vec3,
    pub end_tangent: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySample {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Simulated time since the launch.
    pub elapsed: f32,
    pub bounces: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BounceEvent {
    pub location: Vec3,
    pub normal: Vec3,
    pub incoming_velocity: Vec3,
}

/// The result of a prediction. Each prediction replaces the previous one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrajectoryPath {
    segments: Vec<PathSegment>,
    samples: Vec<TrajectorySample>,
    bounces: Vec<BounceEvent>,
}

impl TrajectoryPath {
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn samples(&self) -> &[TrajectorySample] {
        &self.samples
    }

    pub fn bounces(&self) -> &[BounceEvent] {
        &self.bounces
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.bounces.is_empty()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.samples.clear();
        self.bounces.clear();
    }
}

pub fn projectile_location_at(origin: Vec3, velocity: Vec3, gravity: Vec3, time: f32) -> Vec3 {
    origin + velocity * time + 0.5 * gravity * time * time
}

/// Velocity after bouncing off a surface: friction slows the tangential part down, bounciness
/// scales the rebound along the normal.
pub fn reflect_velocity(normal: Vec3, velocity: Vec3, friction: f32, bounciness: f32) -> Vec3 {
    let normal = normal.normalize_or_zero();
    let normal_component = normal * normal.dot(velocity);
    let tangential = velocity - normal_component;
    tangential * (1. - friction) - normal_component * bounciness
}

/// Predict the path of a projectile launched from `origin` at `velocity`, into `path`.
pub fn predict<S: ShapeSweep + ?Sized>(
    path: &mut TrajectoryPath,
    world: &S,
    body: &ProjectileBody,
    settings: &TrajectorySettings,
    origin: Vec3,
    velocity: Vec3,
    gravity: Vec3,
) {
    path.clear();
    if settings.step <= 0. {
        warn!("Invalid trajectory step {}, skipping prediction", settings.step);
        return;
    }

    let mut start_location = origin;
    let mut start_velocity = velocity;
    let mut sim_time = 0.;
    let mut elapsed = 0.;
    let mut trace_start = origin;
    let mut current_velocity = velocity;

    while sim_time < settings.max_sim_time {
        let next_time = sim_time + settings.step;
        let trace_end = projectile_location_at(start_location, start_velocity, gravity, next_time);
        let end_velocity = start_velocity + gravity * next_time;

        let hit = match world.sweep_sphere(body.radius, trace_start, trace_end) {
            Some(hit) => hit,
            None => {
                path.segments.push(PathSegment {
                    start: trace_start,
                    end: trace_end,
                    start_tangent: current_velocity.normalize_or_zero(),
                    end_tangent: end_velocity.normalize_or_zero(),
                });
                elapsed += settings.step;
                path.samples.push(TrajectorySample {
                    position: trace_end,
                    velocity: end_velocity,
                    elapsed,
                    bounces: path.bounces.len() as u32,
                });
                trace_start = trace_end;
                current_velocity = end_velocity;
                sim_time = next_time;
                continue;
            }
        };

        let fraction = hit.fraction.clamp(0., 1.);
        let incoming_velocity =
            start_velocity + gravity * (next_time - settings.step * (1. - fraction));
        path.segments.push(PathSegment {
            start: trace_start,
            end: hit.location,
            start_tangent: current_velocity.normalize_or_zero(),
            end_tangent: incoming_velocity.normalize_or_zero(),
        });
        path.bounces.push(BounceEvent {
            location: hit.location,
            normal: hit.normal,
            incoming_velocity,
        });
        elapsed += settings.step * fraction;

        let reflected = reflect_velocity(hit.normal, incoming_velocity, body.friction, body.bounciness);
        path.samples.push(TrajectorySample {
            position: hit.location,
            velocity: reflected,
            elapsed,
            bounces: path.bounces.len() as u32,
        });
        if path.bounces.len() as u32 >= settings.max_bounces {
            break;
        }

        start_location = hit.location;
        start_velocity = reflected;
        sim_time = settings.bounce_epsilon;
        trace_start = projectile_location_at(start_location, start_velocity, gravity, sim_time);
        current_velocity = start_velocity + gravity * sim_time;
    }
}
