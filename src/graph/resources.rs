//! Per-frame named resource table.
//!
//! Passes publish textures here during their run phase and later passes of
//! the same frame look them up by name. The table is created empty for every
//! frame by [`FramePassList::execute`](crate::graph::FramePassList::execute),
//! so a lookup never observes a handle from a previous frame.

use rustc_hash::FxHashMap;

use crate::core::texture::TextureId;

#[derive(Debug, Default, Clone)]
pub struct FrameResources {
    textures: FxHashMap<&'static str, TextureId>,
}

impl FrameResources {
    /// Identification buffer written by the identification pass.
    pub const IDENTIFICATION_TEXTURE: &'static str = "_OutlineIdentificationTexture";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `texture` under `name`, returning the handle it replaced.
    pub fn publish(&mut self, name: &'static str, texture: TextureId) -> Option<TextureId> {
        log::trace!("Publishing frame resource `{name}`");
        self.textures.insert(name, texture)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<TextureId> {
        self.textures.get(name).copied()
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.textures.contains_key(name)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn clear(&mut self) {
        self.textures.clear();
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    #[test]
    fn test_publish_replaces_previous_handle() {
        let mut textures: SlotMap<TextureId, ()> = SlotMap::with_key();
        let first = textures.insert(());
        let second = textures.insert(());

        let mut resources = FrameResources::new();
        assert!(resources.get(FrameResources::IDENTIFICATION_TEXTURE).is_none());
        assert_eq!(
            resources.publish(FrameResources::IDENTIFICATION_TEXTURE, first),
            None
        );
        assert_eq!(
            resources.publish(FrameResources::IDENTIFICATION_TEXTURE, second),
            Some(first)
        );
        assert_eq!(
            resources.get(FrameResources::IDENTIFICATION_TEXTURE),
            Some(second)
        );
        assert_eq!(resources.len(), 1);

        resources.clear();
        assert!(resources.is_empty());
    }
}
