use inkdraft_blob::{CachedImage, ImageId};

/// Images staged by one editing session
///
/// Content images keep staging order; at most one cover exists at a time.
#[derive(Debug, Clone, Default)]
pub struct ImageRegistry {
    content: Vec<CachedImage>,
    cover: Option<CachedImage>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from images loaded back from the store
    pub fn from_images<I: IntoIterator<Item = CachedImage>>(images: I) -> Self {
        let mut registry = Self::new();
        for image in images {
            registry.insert(image);
        }
        registry
    }

    /// Track an image; returns the cover it replaced, if any
    pub fn insert(&mut self, image: CachedImage) -> Option<CachedImage> {
        if image.is_cover() {
            self.cover.replace(image)
        } else {
            if !self.contains(image.id()) {
                self.content.push(image);
            }
            None
        }
    }

    pub fn remove(&mut self, id: &ImageId) -> Option<CachedImage> {
        if self.cover.as_ref().is_some_and(|c| c.id() == id) {
            return self.cover.take();
        }
        let index = self.content.iter().position(|image| image.id() == id)?;
        Some(self.content.remove(index))
    }

    pub fn take_cover(&mut self) -> Option<CachedImage> {
        self.cover.take()
    }

    pub fn get(&self, id: &ImageId) -> Option<&CachedImage> {
        self.cover
            .iter()
            .chain(self.content.iter())
            .find(|image| image.id() == id)
    }

    pub fn contains(&self, id: &ImageId) -> bool {
        self.get(id).is_some()
    }

    pub fn content(&self) -> &[CachedImage] {
        &self.content
    }

    pub fn cover(&self) -> Option<&CachedImage> {
        self.cover.as_ref()
    }

    /// Every tracked image, content first in staging order, cover last
    pub fn iter(&self) -> impl Iterator<Item = &CachedImage> {
        self.content.iter().chain(self.cover.iter())
    }

    /// Ids recorded in a draft snapshot
    pub fn ids(&self) -> Vec<ImageId> {
        self.iter().map(|image| image.id().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.content.len() + usize::from(self.cover.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
