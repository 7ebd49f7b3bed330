//! Write-through result cache
//!
//! Memoizes (property, CPU, mechanism) → value. Entries are created on
//! first read and removed immediately before a write to the same
//! (property, CPU), so no stale read is observable between a write and
//! the next read. The cache belongs to one framework instance and can be
//! disabled at construction, turning every lookup into a miss for test
//! harnesses that must observe raw hardware state.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::props::{MechanismId, PropertyId, PropertyValue};

pub struct PropsCache {
    enabled: bool,
    map: RwLock<HashMap<(PropertyId, u32, MechanismId), PropertyValue>>,
}

impl PropsCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            map: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, prop: PropertyId, cpu: u32, mechanism: MechanismId) -> Option<PropertyValue> {
        if !self.enabled {
            return None;
        }
        self.map.read().get(&(prop, cpu, mechanism)).cloned()
    }

    /// Store a value and hand it back, for compute-and-cache call sites.
    pub fn add(
        &self,
        prop: PropertyId,
        cpu: u32,
        mechanism: MechanismId,
        value: PropertyValue,
    ) -> PropertyValue {
        if self.enabled {
            self.map
                .write()
                .insert((prop, cpu, mechanism), value.clone());
        }
        value
    }

    /// Drop every mechanism's entry for (property, CPU). Must be called
    /// immediately before any write targeting the pair: a write through
    /// one mechanism invalidates values read through the others too.
    pub fn remove(&self, prop: PropertyId, cpu: u32) {
        if !self.enabled {
            return;
        }
        self.map
            .write()
            .retain(|&(p, c, _), _| !(p == prop && c == cpu));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_get_remove() {
        let cache = PropsCache::new(true);
        assert_eq!(cache.get(PropertyId::Epb, 0, MechanismId::Msr), None);

        let value = cache.add(PropertyId::Epb, 0, MechanismId::Msr, PropertyValue::Int(6));
        assert_eq!(value, PropertyValue::Int(6));
        assert_eq!(
            cache.get(PropertyId::Epb, 0, MechanismId::Msr),
            Some(PropertyValue::Int(6))
        );

        // Other CPUs are unaffected by removal.
        cache.add(PropertyId::Epb, 1, MechanismId::Msr, PropertyValue::Int(8));
        cache.remove(PropertyId::Epb, 0);
        assert_eq!(cache.get(PropertyId::Epb, 0, MechanismId::Msr), None);
        assert_eq!(
            cache.get(PropertyId::Epb, 1, MechanismId::Msr),
            Some(PropertyValue::Int(8))
        );
    }

    #[test]
    fn test_remove_covers_all_mechanisms() {
        let cache = PropsCache::new(true);
        cache.add(
            PropertyId::Turbo,
            0,
            MechanismId::Sysfs,
            PropertyValue::Bool(true),
        );
        cache.add(
            PropertyId::Turbo,
            0,
            MechanismId::Msr,
            PropertyValue::Bool(true),
        );
        cache.remove(PropertyId::Turbo, 0);
        assert_eq!(cache.get(PropertyId::Turbo, 0, MechanismId::Sysfs), None);
        assert_eq!(cache.get(PropertyId::Turbo, 0, MechanismId::Msr), None);
    }

    #[test]
    fn test_disabled_cache_is_passthrough() {
        let cache = PropsCache::new(false);
        cache.add(PropertyId::Epb, 0, MechanismId::Msr, PropertyValue::Int(6));
        assert_eq!(cache.get(PropertyId::Epb, 0, MechanismId::Msr), None);
    }
}
