use std::fmt;

use bevy::prelude::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalError {
    /// The portal has no linked counterpart.
    NoLink(Entity),
    /// The linked entity is gone or is not a portal anymore.
    DanglingLink { portal: Entity, link: Entity },
    /// No camera is available to look through the portals.
    MissingViewer,
}

impl fmt::Display for PortalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortalError::NoLink(portal) => write!(f, "portal {:?} is not linked", portal),
            PortalError::DanglingLink { portal, link } => {
                write!(f, "portal {:?} is linked to {:?}, which is not a portal", portal, link)
            }
            PortalError::MissingViewer => write!(f, "no viewer camera to capture portals for"),
        }
    }
}

impl std::error::Error for PortalError {}
