use bevy::{prelude::*, utils::HashSet};
use bevy_rapier3d::prelude::*;

use super::simulation::{ShapeSweep, SweepHit};

/// Sweeps against the Rapier world, skipping sensors and a set of ignored bodies.
pub struct RapierSweep<'a> {
    context: &'a RapierContext,
    ignored: &'a HashSet<Entity>,
}

impl<'a> RapierSweep<'a> {
    pub fn new(context: &'a RapierContext, ignored: &'a HashSet<Entity>) -> Self {
        RapierSweep { context, ignored }
    }

    /// Outward normal of the collider a sphere centered at `center` already overlaps.
    fn escape_normal(&self, center: Vec3, predicate: &impl Fn(Entity) -> bool) -> Option<Vec3> {
        let filter = QueryFilter::default().exclude_sensors().predicate(predicate);
        let (_entity, projection) = self.context.project_point(center, false, filter)?;
        let outward = if projection.is_inside {
            projection.point - center
        } else {
            center - projection.point
        };
        outward.try_normalize()
    }
}

impl ShapeSweep for RapierSweep<'_> {
    fn sweep_sphere(&self, radius: f32, from: Vec3, to: Vec3) -> Option<SweepHit> {
        let motion = to - from;
        if motion.length_squared() <= f32::EPSILON {
            return None;
        }
        let predicate = |entity: Entity| !self.ignored.contains(&entity);
        let filter = QueryFilter::default().exclude_sensors().predicate(&predicate);
        let (entity, toi) = self.context.cast_shape(
            from,
            Quat::IDENTITY,
            motion,
            &Collider::ball(radius),
            1.,
            filter,
        )?;
        let fraction = toi.toi.clamp(0., 1.);
        let location = from + motion * fraction;
        // Normal 1 belongs to the hit collider and is expressed in world space.
        let normal = match toi.status {
            TOIStatus::Penetrating => self.escape_normal(from, &predicate)?,
            _ => toi.normal1.try_normalize()?,
        };
        trace!("Trajectory sweep hit {:?} at {}", entity, location);
        Some(SweepHit {
            location,
            normal,
            fraction,
        })
    }
}

#[cfg(test)]
mod tests {
    use bevy_rapier3d::rapier::prelude::{vector, ColliderBuilder};

    use super::*;
    use crate::plugins::trajectory::simulation::reflect_velocity;

    const RADIUS: f32 = 0.1;

    struct TestWorld {
        context: RapierContext,
        next_entity: u32,
    }

    impl TestWorld {
        /// A wide floor whose top face is at y = 0.
        fn with_floor() -> (Self, Entity) {
            let mut world = TestWorld {
                context: RapierContext::default(),
                next_entity: 0,
            };
            let floor = world.add(ColliderBuilder::cuboid(50., 0.5, 50.).translation(vector![0., -0.5, 0.]));
            (world, floor)
        }

        fn add(&mut self, builder: ColliderBuilder) -> Entity {
            let entity = Entity::from_raw(self.next_entity);
            self.next_entity += 1;
            self.context
                .colliders
                .insert(builder.user_data(entity.to_bits() as u128).build());
            self.context.update_query_pipeline();
            entity
        }

        fn sweep(&self, ignored: &HashSet<Entity>, from: Vec3, to: Vec3) -> Option<SweepHit> {
            RapierSweep::new(&self.context, ignored).sweep_sphere(RADIUS, from, to)
        }
    }

    #[test]
    fn sweep_stops_where_the_ball_touches_the_floor() {
        let (world, _floor) = TestWorld::with_floor();
        let hit = world
            .sweep(&HashSet::default(), Vec3::new(0., 1., 0.), Vec3::new(0., -1., 0.))
            .unwrap();
        assert!((hit.fraction - 0.45).abs() < 1e-3);
        assert!(hit.location.abs_diff_eq(Vec3::new(0., RADIUS, 0.), 1e-3));
        assert!(hit.normal.abs_diff_eq(Vec3::Y, 1e-3));
    }

    #[test]
    fn grazing_impacts_bounce_off_the_floor() {
        let (world, _floor) = TestWorld::with_floor();
        for (from, to) in [
            // About 60 degrees below the horizon.
            (Vec3::new(0., 1., 0.), Vec3::new(0.6, -0.04, 0.)),
            // About 17 degrees below the horizon.
            (Vec3::new(0., 0.3, 0.), Vec3::new(2., -0.3, 0.)),
        ] {
            let hit = world.sweep(&HashSet::default(), from, to).unwrap();
            assert!(hit.normal.abs_diff_eq(Vec3::Y, 1e-3), "normal {}", hit.normal);
            assert!((hit.location.y - RADIUS).abs() < 1e-3);

            let incoming = (to - from).normalize() * 10.;
            let reflected = reflect_velocity(hit.normal, incoming, 0.2, 0.6);
            assert!(reflected.x > 0., "reflected {}", reflected);
            assert!(reflected.y > 0., "reflected {}", reflected);
        }
    }

    #[test]
    fn ignored_bodies_and_sensors_are_swept_through() {
        let (mut world, _floor) = TestWorld::with_floor();
        let launcher = world.add(ColliderBuilder::cuboid(0.2, 0.05, 0.2).translation(vector![0., 0.7, 0.]));
        world.add(
            ColliderBuilder::cuboid(0.2, 0.05, 0.2)
                .translation(vector![0., 0.4, 0.])
                .sensor(true),
        );
        let from = Vec3::new(0., 1., 0.);
        let to = Vec3::new(0., -1., 0.);

        let blocked = world.sweep(&HashSet::default(), from, to).unwrap();
        assert!(blocked.location.y > 0.7);

        let ignored: HashSet<Entity> = [launcher].into_iter().collect();
        let hit = world.sweep(&ignored, from, to).unwrap();
        assert!(hit.location.abs_diff_eq(Vec3::new(0., RADIUS, 0.), 1e-3));
    }

    #[test]
    fn empty_motion_hits_nothing() {
        let (world, _floor) = TestWorld::with_floor();
        let at = Vec3::new(0., 1., 0.);
        assert!(world.sweep(&HashSet::default(), at, at).is_none());
    }
}
