use bevy::prelude::*;
use bevy_rapier3d::prelude::{Group, RapierConfiguration, TimestepMode};

pub const WALLS_GROUP: Group = Group::GROUP_1;
pub const PROPS_GROUP: Group = Group::GROUP_2;
pub const PORTAL_GROUP: Group = Group::GROUP_3;
pub const PLAYER_GROUP: Group = Group::GROUP_4;
pub const GROUND_GROUP: Group = Group::GROUP_5;
pub const PROJECTILE_GROUP: Group = Group::GROUP_6;
pub const ALL_GROUPS: Group = Group::ALL;

/// Everything a traveller collides with while it overlaps a portal sensor: walls are left out so
/// it can sink into the surface the portal sits on.
pub const IN_PORTAL_GROUPS: Group = PLAYER_GROUP
    .union(PROPS_GROUP)
    .union(PORTAL_GROUP)
    .union(GROUND_GROUP)
    .union(PROJECTILE_GROUP);

#[derive(Debug)]
pub struct PhysicsPlugin;

impl Plugin for PhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.add_startup_system(configure_rapier);
    }
}

fn configure_rapier(mut config: ResMut<RapierConfiguration>) {
    // Extra CCD substeps because them portals can go fast
    config.timestep_mode = TimestepMode::Variable {
        max_dt: 1. / 20.,
        time_scale: 1.,
        substeps: 4,
    };
    info!("Rapier gravity set to {}", config.gravity);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn travellers_in_portals_ignore_walls_only() {
        assert!(!IN_PORTAL_GROUPS.contains(WALLS_GROUP));
        for group in [PLAYER_GROUP, PROPS_GROUP, PORTAL_GROUP, GROUND_GROUP, PROJECTILE_GROUP] {
            assert!(IN_PORTAL_GROUPS.contains(group));
        }
    }
}
