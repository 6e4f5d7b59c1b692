//! Per-source tracking manifest produced at compile time.

use std::fmt;

use smol_str::SmolStr;

/// How the entities of one query source are materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTrackingInfo {
    /// Source alias.
    pub alias: SmolStr,
    /// Entity type name.
    pub entity_type: SmolStr,
    /// Whether instances are registered with the unit of work.
    pub requires_tracking: bool,
    /// Navigation paths included from this source.
    pub include_paths: Vec<Vec<SmolStr>>,
}

/// Creates [`EntityTrackingInfo`]s for a compiled query.
///
/// Replace the default to change tracking per entity type, for example to
/// never track read-only reference data.
pub trait EntityTrackingInfoFactory: Send + Sync {
    /// Describe one source.
    fn create(
        &self,
        alias: &str,
        entity_type: &str,
        requires_tracking: bool,
        include_paths: Vec<Vec<SmolStr>>,
    ) -> EntityTrackingInfo;
}

/// Uses the query's tracking behavior for every source.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEntityTrackingInfoFactory;

impl EntityTrackingInfoFactory for DefaultEntityTrackingInfoFactory {
    fn create(
        &self,
        alias: &str,
        entity_type: &str,
        requires_tracking: bool,
        include_paths: Vec<Vec<SmolStr>>,
    ) -> EntityTrackingInfo {
        EntityTrackingInfo {
            alias: alias.into(),
            entity_type: entity_type.into(),
            requires_tracking,
            include_paths,
        }
    }
}

impl fmt::Display for EntityTrackingInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.alias, self.entity_type)?;
        if self.requires_tracking {
            write!(f, " tracked")?;
        }
        for path in &self.include_paths {
            write!(f, " include {}", path.join("."))?;
        }
        Ok(())
    }
}
