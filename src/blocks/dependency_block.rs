use crate::Result;
use crate::blocks::common::{BlockHeader, BlockParse, read_u16, read_u32, validate_buffer_size};

/// Dependency type code for a plain vector of referenced channels.
pub const DEPENDENCY_TYPE_VECTOR: u16 = 1;
/// Base code for N-dimensional dependencies; the low byte carries N.
pub const DEPENDENCY_TYPE_NDIM: u16 = 256;

/// CDBLOCK: declares a channel as an array or structure composed of other
/// channels.
///
/// Each reference is a (data group, channel group, channel) address triple;
/// the runtime layer resolves these to (group index, channel index) pairs
/// once the whole file graph is known, since a reference may point into a
/// group that appears later in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyBlock {
    pub header: BlockHeader,
    /// `DEPENDENCY_TYPE_VECTOR`, or `DEPENDENCY_TYPE_NDIM + n` for n dims.
    pub dependency_type: u16,
    /// Referenced (dg_addr, cg_addr, cn_addr) triples, in declaration order.
    pub refs: Vec<(u32, u32, u32)>,
    /// Per-dimension sizes for N-dimensional dependencies, empty for vectors.
    pub dims: Vec<u16>,
}

impl DependencyBlock {
    pub fn new_vector(count: usize) -> Self {
        DependencyBlock {
            header: BlockHeader::new("CD", Self::byte_size(count, 0) as u16),
            dependency_type: DEPENDENCY_TYPE_VECTOR,
            refs: vec![(0, 0, 0); count],
            dims: Vec::new(),
        }
    }

    pub fn new_ndim(dims: Vec<u16>) -> Self {
        let count: usize = dims.iter().map(|&d| d as usize).product();
        DependencyBlock {
            header: BlockHeader::new("CD", Self::byte_size(count, dims.len()) as u16),
            dependency_type: DEPENDENCY_TYPE_NDIM + dims.len() as u16,
            refs: vec![(0, 0, 0); count],
            dims,
        }
    }

    fn byte_size(ref_count: usize, dim_count: usize) -> usize {
        8 + 12 * ref_count + 2 * dim_count
    }

    /// Declared dimension sizes; a vector reports one dimension covering
    /// all references.
    pub fn dimensions(&self) -> Vec<usize> {
        if self.dims.is_empty() {
            vec![self.refs.len()]
        } else {
            self.dims.iter().map(|&d| d as usize).collect()
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let size = Self::byte_size(self.refs.len(), self.dims.len());
        let mut buffer = BlockHeader::new("CD", size as u16).to_bytes();
        buffer.extend_from_slice(&self.dependency_type.to_le_bytes());
        buffer.extend_from_slice(&(self.refs.len() as u16).to_le_bytes());
        for &(dg, cg, cn) in &self.refs {
            buffer.extend_from_slice(&dg.to_le_bytes());
            buffer.extend_from_slice(&cg.to_le_bytes());
            buffer.extend_from_slice(&cn.to_le_bytes());
        }
        for &d in &self.dims {
            buffer.extend_from_slice(&d.to_le_bytes());
        }
        buffer
    }
}

impl BlockParse<'_> for DependencyBlock {
    const ID: &'static str = "CD";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, 8)?;
        let dependency_type = read_u16(bytes, 4);
        let count = read_u16(bytes, 6) as usize;
        validate_buffer_size(bytes, 8 + 12 * count)?;

        let mut refs = Vec::with_capacity(count);
        for i in 0..count {
            let base = 8 + 12 * i;
            refs.push((
                read_u32(bytes, base),
                read_u32(bytes, base + 4),
                read_u32(bytes, base + 8),
            ));
        }

        let dim_count = dependency_type.saturating_sub(DEPENDENCY_TYPE_NDIM) as usize;
        let mut dims = Vec::with_capacity(dim_count);
        if dim_count > 0 {
            let base = 8 + 12 * count;
            validate_buffer_size(bytes, base + 2 * dim_count)?;
            for i in 0..dim_count {
                dims.push(read_u16(bytes, base + 2 * i));
            }
        }

        Ok(Self {
            header,
            dependency_type,
            refs,
            dims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_dependency_roundtrip() {
        let mut cd = DependencyBlock::new_vector(3);
        cd.refs = vec![(100, 130, 160), (100, 130, 388), (400, 430, 460)];
        let parsed = DependencyBlock::from_bytes(&cd.to_bytes()).unwrap();
        assert_eq!(parsed.refs, cd.refs);
        assert_eq!(parsed.dimensions(), vec![3]);
    }

    #[test]
    fn ndim_dependency_roundtrip() {
        let cd = DependencyBlock::new_ndim(vec![2, 3]);
        let parsed = DependencyBlock::from_bytes(&cd.to_bytes()).unwrap();
        assert_eq!(parsed.refs.len(), 6);
        assert_eq!(parsed.dimensions(), vec![2, 3]);
    }
}
