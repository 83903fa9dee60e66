//! Shader permutation cache
//!
//! One program per (material definition, pass kind), built the first time it is asked
//! for. Failed builds are cached too so a broken definition is reported once instead
//! of every frame. The cache is shared with a [`ShaderCacheInvalidator`] attached to the
//! material library; deleted or reloaded definitions lose their programs, which are
//! handed back to the device at the start of the next frame. Events that arrive while
//! the cache is borrowed are queued and applied on its next use.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use log::{debug, info, warn};

use crate::foundation::collections::{MaterialDefinitionId, SecondaryMap};
use crate::gpu::{GraphicsDevice, ProgramHandle};
use crate::material::{MaterialEventHandler, MaterialLibrary};

use super::light_snapshot::LightClass;
use super::shader_library::material_program_sources;

/// Pass a material program is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Ambient lighting accumulation
    Ambient,
    /// Directional lighting accumulation
    Directional,
    /// Point lighting accumulation
    Point,
    /// Spot lighting accumulation
    Spot,
    /// Directional lighting with a variance shadow map
    DirectionalShadow,
    /// Point lighting with a variance cube shadow map
    PointShadow,
    /// Spot lighting with a variance shadow map
    SpotShadow,
    /// Material combination of the accumulated lighting
    Material,
}

impl PassKind {
    /// Every pass kind
    pub const ALL: [Self; 8] = [
        Self::Ambient,
        Self::Directional,
        Self::Point,
        Self::Spot,
        Self::DirectionalShadow,
        Self::PointShadow,
        Self::SpotShadow,
        Self::Material,
    ];

    /// Lighting pass for a light class; ambient lights have no shadow variant
    pub fn lighting(class: LightClass, shadowed: bool) -> Self {
        match (class, shadowed) {
            (LightClass::Ambient, _) => Self::Ambient,
            (LightClass::Directional, false) => Self::Directional,
            (LightClass::Directional, true) => Self::DirectionalShadow,
            (LightClass::Point, false) => Self::Point,
            (LightClass::Point, true) => Self::PointShadow,
            (LightClass::Spot, false) => Self::Spot,
            (LightClass::Spot, true) => Self::SpotShadow,
        }
    }

    /// Name used in program names
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ambient => "ambient",
            Self::Directional => "directional",
            Self::Point => "point",
            Self::Spot => "spot",
            Self::DirectionalShadow => "directional_shadow",
            Self::PointShadow => "point_shadow",
            Self::SpotShadow => "spot_shadow",
            Self::Material => "material",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Build state of one permutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permutation {
    Built(ProgramHandle),
    Failed,
}

/// Programs of one material definition, one slot per pass kind
#[derive(Debug, Clone, Default)]
pub struct MaterialShaderSet {
    programs: [Option<Permutation>; 8],
}

impl MaterialShaderSet {
    /// Program for a pass, if it was built successfully
    pub fn program(&self, pass: PassKind) -> Option<ProgramHandle> {
        match self.programs[pass.index()] {
            Some(Permutation::Built(program)) => Some(program),
            _ => None,
        }
    }

    fn built(&self) -> impl Iterator<Item = ProgramHandle> + '_ {
        self.programs.iter().filter_map(|slot| match slot {
            Some(Permutation::Built(program)) => Some(*program),
            _ => None,
        })
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShaderCacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Programs built
    pub builds: u64,
    /// Builds that failed
    pub failures: u64,
    /// Definitions invalidated
    pub invalidations: u64,
}

/// Lazily built material programs keyed by definition
#[derive(Debug, Default)]
pub struct ShaderPermutationCache {
    sets: SecondaryMap<MaterialDefinitionId, MaterialShaderSet>,
    pending_release: Vec<ProgramHandle>,
    deferred: Rc<RefCell<Vec<MaterialDefinitionId>>>,
    stats: ShaderCacheStats,
}

impl ShaderPermutationCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache ready to be shared with an invalidator
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Event handler that invalidates `cache` on definition delete/reload
    pub fn invalidator(cache: &Rc<RefCell<Self>>) -> ShaderCacheInvalidator {
        ShaderCacheInvalidator {
            cache: Rc::downgrade(cache),
            deferred: cache.borrow().deferred.clone(),
        }
    }

    /// Program for `(definition, pass)`, building it on first use
    ///
    /// Returns `None` when the definition is unknown or its program failed to build.
    pub fn get_program(
        &mut self,
        device: &mut dyn GraphicsDevice,
        library: &MaterialLibrary,
        definition: MaterialDefinitionId,
        pass: PassKind,
    ) -> Option<ProgramHandle> {
        self.apply_deferred();
        if let Some(slot) = self.sets.get(definition).and_then(|set| set.programs[pass.index()]) {
            self.stats.hits += 1;
            return match slot {
                Permutation::Built(program) => Some(program),
                Permutation::Failed => None,
            };
        }

        let Some(material_definition) = library.definition(definition) else {
            debug!("No material definition {:?} for {} pass", definition, pass.name());
            return None;
        };

        let name = format!("{}:{}", material_definition.name, pass.name());
        let (vertex, fragment) = material_program_sources(material_definition, pass);
        self.stats.builds += 1;
        let permutation = match device.create_program(&name, &vertex, &fragment) {
            Ok(program) => {
                info!("Built shader permutation '{}'", name);
                Permutation::Built(program)
            }
            Err(err) => {
                warn!("Shader permutation '{}' failed, draws using it are skipped: {}", name, err);
                self.stats.failures += 1;
                Permutation::Failed
            }
        };

        if !self.sets.contains_key(definition) {
            self.sets.insert(definition, MaterialShaderSet::default());
        }
        if let Some(set) = self.sets.get_mut(definition) {
            set.programs[pass.index()] = Some(permutation);
        }

        match permutation {
            Permutation::Built(program) => Some(program),
            Permutation::Failed => None,
        }
    }

    /// Check if any permutation of the definition is cached
    pub fn contains(&self, definition: MaterialDefinitionId) -> bool {
        self.sets.contains_key(definition)
    }

    /// Programs of a definition
    pub fn shader_set(&self, definition: MaterialDefinitionId) -> Option<&MaterialShaderSet> {
        self.sets.get(definition)
    }

    /// Drop a definition's programs; they are released by [`Self::release_pending`]
    pub fn invalidate(&mut self, definition: MaterialDefinitionId) {
        if let Some(set) = self.sets.remove(definition) {
            self.pending_release.extend(set.built());
            self.stats.invalidations += 1;
            debug!("Invalidated shader permutations of {:?}", definition);
        }
    }

    /// Programs waiting to be released
    pub fn pending_release(&self) -> usize {
        self.pending_release.len()
    }

    /// Invalidate definitions whose events arrived while the cache was borrowed
    fn apply_deferred(&mut self) {
        let deferred = std::mem::take(&mut *self.deferred.borrow_mut());
        for definition in deferred {
            self.invalidate(definition);
        }
    }

    /// Delete invalidated programs on the device
    pub fn release_pending(&mut self, device: &mut dyn GraphicsDevice) -> usize {
        self.apply_deferred();
        let count = self.pending_release.len();
        for program in self.pending_release.drain(..) {
            device.delete_program(program);
        }
        count
    }

    /// Delete every program
    pub fn clear(&mut self, device: &mut dyn GraphicsDevice) {
        let definitions: Vec<MaterialDefinitionId> = self.sets.keys().collect();
        for definition in definitions {
            self.invalidate(definition);
        }
        self.release_pending(device);
    }

    /// Counters
    pub fn stats(&self) -> ShaderCacheStats {
        self.stats
    }
}

/// Material library handler forwarding delete/reload events to a shared cache
#[derive(Debug, Clone)]
pub struct ShaderCacheInvalidator {
    cache: Weak<RefCell<ShaderPermutationCache>>,
    deferred: Rc<RefCell<Vec<MaterialDefinitionId>>>,
}

impl ShaderCacheInvalidator {
    fn invalidate(&self, definition: MaterialDefinitionId) {
        let Some(cache) = self.cache.upgrade() else {
            return;
        };
        let busy = match cache.try_borrow_mut() {
            Ok(mut cache) => {
                cache.invalidate(definition);
                false
            }
            Err(_) => true,
        };
        if busy {
            debug!("Shader cache busy, invalidation of {:?} queued", definition);
            self.deferred.borrow_mut().push(definition);
        }
    }
}

impl MaterialEventHandler for ShaderCacheInvalidator {
    fn on_delete_material_definition(&mut self, definition: MaterialDefinitionId) {
        self.invalidate(definition);
    }

    fn on_reload_material_definition(&mut self, definition: MaterialDefinitionId) {
        self.invalidate(definition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;
    use crate::material::MaterialDefinition;

    #[test]
    fn test_same_arguments_return_same_program() {
        let mut device = HeadlessDevice::new();
        let mut library = MaterialLibrary::new();
        let definition = library.create_definition(MaterialDefinition::new("stone"));
        let mut cache = ShaderPermutationCache::new();

        let first = cache.get_program(&mut device, &library, definition, PassKind::Point);
        let second = cache.get_program(&mut device, &library, definition, PassKind::Point);
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(device.programs_created(), 1);
        assert_eq!(cache.stats().hits, 1);

        let material = cache.get_program(&mut device, &library, definition, PassKind::Material);
        assert_ne!(material, first);
    }

    #[test]
    fn test_delete_event_invalidates_and_releases_next_frame() {
        let mut device = HeadlessDevice::new();
        let mut library = MaterialLibrary::new();
        let cache = ShaderPermutationCache::shared();
        library.attach_handler(Box::new(ShaderPermutationCache::invalidator(&cache)));

        let definition = library.create_definition(MaterialDefinition::new("stone"));
        let program = cache
            .borrow_mut()
            .get_program(&mut device, &library, definition, PassKind::Ambient)
            .unwrap();
        assert!(cache.borrow().contains(definition));

        library.delete_definition(definition);
        assert!(!cache.borrow().contains(definition));
        assert!(device.is_program_alive(program));

        assert_eq!(cache.borrow_mut().release_pending(&mut device), 1);
        assert!(!device.is_program_alive(program));
    }

    #[test]
    fn test_reload_rebuilds_program() {
        let mut device = HeadlessDevice::new();
        let mut library = MaterialLibrary::new();
        let cache = ShaderPermutationCache::shared();
        library.attach_handler(Box::new(ShaderPermutationCache::invalidator(&cache)));
        let definition = library.create_definition(MaterialDefinition::new("stone"));

        cache.borrow_mut().get_program(&mut device, &library, definition, PassKind::Spot);
        library.reload_definition(definition, MaterialDefinition::new("stone"));
        cache.borrow_mut().get_program(&mut device, &library, definition, PassKind::Spot);
        assert_eq!(device.programs_created(), 2);
    }

    #[test]
    fn test_failed_build_is_cached() {
        let mut device = HeadlessDevice::new();
        device.fail_programs_named("broken");
        let mut library = MaterialLibrary::new();
        let definition = library.create_definition(MaterialDefinition::new("broken"));
        let mut cache = ShaderPermutationCache::new();

        for _ in 0..3 {
            assert!(cache
                .get_program(&mut device, &library, definition, PassKind::Directional)
                .is_none());
        }
        assert_eq!(cache.stats().builds, 1);
        assert_eq!(cache.stats().failures, 1);
    }

    #[test]
    fn test_event_while_cache_borrowed_is_applied_later() {
        let mut device = HeadlessDevice::new();
        let mut library = MaterialLibrary::new();
        let cache = ShaderPermutationCache::shared();
        library.attach_handler(Box::new(ShaderPermutationCache::invalidator(&cache)));
        let definition = library.create_definition(MaterialDefinition::new("stone"));
        let program = cache
            .borrow_mut()
            .get_program(&mut device, &library, definition, PassKind::Material)
            .unwrap();

        {
            let _busy = cache.borrow_mut();
            library.reload_definition(definition, MaterialDefinition::new("stone"));
        }
        assert!(cache.borrow().contains(definition));

        let rebuilt = cache
            .borrow_mut()
            .get_program(&mut device, &library, definition, PassKind::Material)
            .unwrap();
        assert_ne!(rebuilt, program);
        assert_eq!(cache.borrow().stats().invalidations, 1);
        assert_eq!(cache.borrow_mut().release_pending(&mut device), 1);
        assert!(!device.is_program_alive(program));
        assert!(device.is_program_alive(rebuilt));
    }

    #[test]
    fn test_dropped_cache_ignores_events() {
        let mut library = MaterialLibrary::new();
        let cache = ShaderPermutationCache::shared();
        library.attach_handler(Box::new(ShaderPermutationCache::invalidator(&cache)));
        drop(cache);
        let definition = library.create_definition(MaterialDefinition::new("stone"));
        assert!(library.delete_definition(definition).is_some());
    }
}
