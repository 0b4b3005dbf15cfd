//! Acoustic material properties for reflecting surfaces.
//!
//! A single broadband absorption coefficient and a diffuse proportion are all
//! the image source model and the diffuse tracer need from a surface.

use crate::error::{ReverbError, Result};

/// Index of a material inside a [`MaterialTable`].
pub type MaterialId = u8;

/// Acoustic properties of a surface material.
///
/// - **Absorption**: fraction of incident energy that is not reflected
/// - **Diffuse proportion**: fraction of the reflected energy that scatters in
///   random directions instead of following the mirror direction
///
/// # Example
///
/// ```
/// use petalsonic_ism::scene::SurfaceMaterial;
///
/// let wall = SurfaceMaterial::CONCRETE;
/// let custom = SurfaceMaterial::new(0.35, 0.4);
/// assert!(custom.validate().is_ok());
/// assert!(wall.absorption < custom.absorption);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceMaterial {
    /// Fraction of sound energy absorbed on reflection (0.0 - 1.0)
    ///
    /// Higher values = "softer" surface (carpet, fabric)
    /// Lower values = "harder" surface (metal, glass)
    pub absorption: f32,

    /// Fraction of reflected energy scattered diffusely (0.0 - 1.0)
    ///
    /// 0.0 = pure specular (mirror-like), 1.0 = pure diffuse (scattered)
    pub diffuse_proportion: f32,
}

impl SurfaceMaterial {
    /// Generic default material with moderate acoustic properties
    pub const GENERIC: Self = Self::new(0.20, 0.05);

    /// Brick material - moderately reflective
    pub const BRICK: Self = Self::new(0.04, 0.05);

    /// Concrete material - very reflective
    pub const CONCRETE: Self = Self::new(0.07, 0.05);

    /// Ceramic material - highly reflective
    pub const CERAMIC: Self = Self::new(0.02, 0.05);

    /// Gravel material - highly absorptive
    pub const GRAVEL: Self = Self::new(0.70, 0.05);

    /// Carpet material - highly absorptive
    pub const CARPET: Self = Self::new(0.69, 0.05);

    /// Glass material - reflective
    pub const GLASS: Self = Self::new(0.03, 0.05);

    /// Plaster material - moderately reflective
    pub const PLASTER: Self = Self::new(0.06, 0.05);

    /// Wood material - moderately absorptive
    pub const WOOD: Self = Self::new(0.07, 0.05);

    /// Metal material
    pub const METAL: Self = Self::new(0.07, 0.05);

    /// Rock material - moderately absorptive
    pub const ROCK: Self = Self::new(0.20, 0.05);

    pub const fn new(absorption: f32, diffuse_proportion: f32) -> Self {
        Self {
            absorption,
            diffuse_proportion,
        }
    }

    /// Validates that all material properties are within valid range [0.0, 1.0]
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.absorption) {
            return Err(ReverbError::Material(format!(
                "Absorption must be between 0.0 and 1.0, got {}",
                self.absorption
            )));
        }

        if !(0.0..=1.0).contains(&self.diffuse_proportion) {
            return Err(ReverbError::Material(format!(
                "Diffuse proportion must be between 0.0 and 1.0, got {}",
                self.diffuse_proportion
            )));
        }

        Ok(())
    }
}

impl Default for SurfaceMaterial {
    fn default() -> Self {
        Self::GENERIC
    }
}

/// Material lookup table used to resolve [`RayHit::material`](crate::scene::RayHit).
///
/// # Example
///
/// ```
/// use petalsonic_ism::scene::{MaterialTable, SurfaceMaterial};
///
/// let mut materials = MaterialTable::new();
/// let wall = materials.add(SurfaceMaterial::CONCRETE)?;
/// let floor = materials.add(SurfaceMaterial::CARPET)?;
///
/// assert_eq!(materials.get(wall), Some(&SurfaceMaterial::CONCRETE));
/// assert_eq!(materials.get(floor), Some(&SurfaceMaterial::CARPET));
/// # Ok::<(), petalsonic_ism::ReverbError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct MaterialTable {
    materials: Vec<SurfaceMaterial>,
}

impl MaterialTable {
    /// Maximum number of materials a table can hold
    pub const CAPACITY: usize = MaterialId::MAX as usize + 1;

    /// Creates a new empty material table
    pub fn new() -> Self {
        Self {
            materials: Vec::new(),
        }
    }

    /// Creates a material table pre-loaded with all common material presets
    ///
    /// Materials are added in the following order:
    /// - 0: GENERIC
    /// - 1: BRICK
    /// - 2: CONCRETE
    /// - 3: CERAMIC
    /// - 4: GRAVEL
    /// - 5: CARPET
    /// - 6: GLASS
    /// - 7: PLASTER
    /// - 8: WOOD
    /// - 9: METAL
    /// - 10: ROCK
    pub fn with_presets() -> Self {
        Self {
            materials: vec![
                SurfaceMaterial::GENERIC,
                SurfaceMaterial::BRICK,
                SurfaceMaterial::CONCRETE,
                SurfaceMaterial::CERAMIC,
                SurfaceMaterial::GRAVEL,
                SurfaceMaterial::CARPET,
                SurfaceMaterial::GLASS,
                SurfaceMaterial::PLASTER,
                SurfaceMaterial::WOOD,
                SurfaceMaterial::METAL,
                SurfaceMaterial::ROCK,
            ],
        }
    }

    /// Adds a material to the table and returns its index
    ///
    /// # Errors
    ///
    /// Returns an error if the material's properties are invalid or the table
    /// already holds [`Self::CAPACITY`] materials
    pub fn add(&mut self, material: SurfaceMaterial) -> Result<MaterialId> {
        material.validate()?;

        if self.materials.len() >= Self::CAPACITY {
            return Err(ReverbError::Material(format!(
                "Material table is full (max {} materials)",
                Self::CAPACITY
            )));
        }

        let index = self.materials.len() as MaterialId;
        self.materials.push(material);
        Ok(index)
    }

    /// Retrieves a material by its index
    pub fn get(&self, index: MaterialId) -> Option<&SurfaceMaterial> {
        self.materials.get(index as usize)
    }

    /// Resolves an optional material reference, as carried by a ray hit
    pub fn lookup(&self, index: Option<MaterialId>) -> Option<&SurfaceMaterial> {
        index.and_then(|index| self.get(index))
    }

    /// Returns the number of materials in the table
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Returns true if the table contains no materials
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Returns an iterator over all materials and their indices
    pub fn iter(&self) -> impl Iterator<Item = (MaterialId, &SurfaceMaterial)> {
        self.materials
            .iter()
            .enumerate()
            .map(|(i, m)| (i as MaterialId, m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_validation() {
        assert!(SurfaceMaterial::CONCRETE.validate().is_ok());
        assert!(SurfaceMaterial::new(1.5, 0.1).validate().is_err());
        assert!(SurfaceMaterial::new(0.5, -0.1).validate().is_err());
        assert!(SurfaceMaterial::new(f32::NAN, 0.1).validate().is_err());
    }

    #[test]
    fn test_material_table() {
        let mut table = MaterialTable::new();
        assert_eq!(table.len(), 0);
        assert!(table.is_empty());

        let idx1 = table.add(SurfaceMaterial::CONCRETE).unwrap();
        let idx2 = table.add(SurfaceMaterial::WOOD).unwrap();

        assert_eq!(idx1, 0);
        assert_eq!(idx2, 1);
        assert_eq!(table.len(), 2);

        assert_eq!(table.get(idx1), Some(&SurfaceMaterial::CONCRETE));
        assert_eq!(table.lookup(Some(idx2)), Some(&SurfaceMaterial::WOOD));
        assert_eq!(table.lookup(None), None);
        assert_eq!(table.get(99), None);
    }

    #[test]
    fn test_invalid_material_is_rejected() {
        let mut table = MaterialTable::new();
        assert!(table.add(SurfaceMaterial::new(2.0, 0.0)).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_table_capacity() {
        let mut table = MaterialTable::new();
        for _ in 0..MaterialTable::CAPACITY {
            table.add(SurfaceMaterial::GENERIC).unwrap();
        }
        assert!(table.add(SurfaceMaterial::GENERIC).is_err());
    }

    #[test]
    fn test_material_table_with_presets() {
        let table = MaterialTable::with_presets();
        assert_eq!(table.len(), 11);

        assert_eq!(table.get(0), Some(&SurfaceMaterial::GENERIC));
        assert_eq!(table.get(2), Some(&SurfaceMaterial::CONCRETE));
        assert_eq!(table.get(8), Some(&SurfaceMaterial::WOOD));
        assert_eq!(table.iter().count(), 11);
    }
}
