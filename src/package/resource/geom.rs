//! GEOM mesh chunk.

use crate::codec::ByteReader;
use crate::error::{Error, Result};
use crate::package::index::TGI;

/// Vertex attribute usage codes.
pub mod usage {
    pub const POSITION: u32 = 1;
    pub const NORMAL: u32 = 2;
    pub const UV: u32 = 3;
    pub const BONE_ASSIGNMENT: u32 = 4;
    pub const WEIGHTS: u32 = 5;
    pub const TANGENT: u32 = 6;
    pub const COLOR: u32 = 7;
    pub const VERTEX_ID: u32 = 10;
}

/// Face record flag: each vertex carries a UV index.
pub const FACE_VERTEX_UV: u32 = 1 << 3;
/// Face record flag: each vertex carries a normal index.
pub const FACE_VERTEX_NORMAL: u32 = 1 << 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexFormat {
    pub data_type: u32,
    pub sub_type: u32,
    pub bytes_per_element: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VertexElement {
    Position([f32; 3]),
    Normal([f32; 3]),
    Uv([f32; 2]),
    BoneAssignment(u32),
    Weights(u32),
    Tangent([f32; 3]),
    Color(u32),
    VertexId(u32),
}

impl VertexElement {
    fn read(format: &VertexFormat, r: &mut ByteReader<'_>) -> Result<Self> {
        let vec3 = |r: &mut ByteReader<'_>| -> Result<[f32; 3]> {
            Ok([r.read_f32()?, r.read_f32()?, r.read_f32()?])
        };
        Ok(match format.data_type {
            usage::POSITION => VertexElement::Position(vec3(r)?),
            usage::NORMAL => VertexElement::Normal(vec3(r)?),
            usage::TANGENT => VertexElement::Tangent(vec3(r)?),
            usage::UV => VertexElement::Uv([r.read_f32()?, r.read_f32()?]),
            usage::BONE_ASSIGNMENT => VertexElement::BoneAssignment(r.read_u32()?),
            usage::WEIGHTS => VertexElement::Weights(r.read_u32()?),
            usage::COLOR => VertexElement::Color(r.read_u32()?),
            usage::VERTEX_ID => VertexElement::VertexId(r.read_u32()?),
            other => {
                return Err(Error::format(format!("unknown GEOM vertex data type {other}")));
            }
        })
    }

    /// Bytes this element occupies in a vertex record.
    pub fn size_of(data_type: u32) -> Option<usize> {
        match data_type {
            usage::POSITION | usage::NORMAL | usage::TANGENT => Some(12),
            usage::UV => Some(8),
            usage::BONE_ASSIGNMENT | usage::WEIGHTS | usage::COLOR | usage::VERTEX_ID => Some(4),
            _ => None,
        }
    }
}

/// Version 12 auxiliary list entry: an id and a run of UV pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct UvStitch {
    pub index: u32,
    pub pairs: Vec<[f32; 2]>,
}

/// Version 12 seam stitch record.
#[derive(Debug, Clone, PartialEq)]
pub struct SeamStitch {
    pub index: u32,
    pub vertex_id: u16,
    pub unknown: [u16; 2],
    pub values: [f32; 13],
    pub flags: u8,
}

#[derive(Debug, Clone)]
pub struct GeomChunk {
    pub version: u32,
    /// Absolute offset of the chunk's key list.
    pub tgi_offset: usize,
    pub tgi_size: u32,
    pub embedded_id: u32,
    pub mtnf: Option<Vec<u8>>,
    pub merge_group: u32,
    pub sort_order: u32,
    pub vertex_formats: Vec<VertexFormat>,
    pub vertices: Vec<Vec<VertexElement>>,
    /// Flat triangle list, three indices per face.
    pub faces: Vec<u16>,
    pub skin_index: Option<i32>,
    pub uv_stitches: Vec<UvStitch>,
    pub seam_stitches: Vec<SeamStitch>,
    pub bone_hashes: Vec<u32>,
    pub tgi_list: Vec<TGI>,
    raw_data: Vec<u8>,
}

fn read_count(r: &mut ByteReader<'_>, element_size: usize, what: &str) -> Result<usize> {
    let count = r.read_i32()?;
    if count < 0 || (count as usize).saturating_mul(element_size) > r.remaining() {
        return Err(Error::format(format!(
            "GEOM {what} count {count} does not fit in {} remaining bytes",
            r.remaining()
        )));
    }
    Ok(count as usize)
}

impl GeomChunk {
    pub const TAG: [u8; 4] = *b"GEOM";

    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data);
        let tag = r.read_fourcc()?;
        if tag != Self::TAG {
            return Err(Error::format(format!("expected GEOM tag, found {tag:02X?}")));
        }
        let version = r.read_u32()?;
        let tgi_offset = (r.read_u32()? as usize).saturating_add(r.position());
        let tgi_size = r.read_u32()?;

        let embedded_id = r.read_u32()?;
        let mtnf = if embedded_id != 0 {
            let size = r.read_u32()? as usize;
            Some(r.read_bytes(size)?)
        } else {
            None
        };
        let merge_group = r.read_u32()?;
        let sort_order = r.read_u32()?;

        let vertex_count = r.read_i32()?;
        let format_count = read_count(&mut r, 9, "vertex format")?;
        let mut vertex_formats = Vec::with_capacity(format_count);
        for _ in 0..format_count {
            vertex_formats.push(VertexFormat {
                data_type: r.read_u32()?,
                sub_type: r.read_u32()?,
                bytes_per_element: r.read_u8()?,
            });
        }

        let mut stride = 0usize;
        for format in &vertex_formats {
            stride += VertexElement::size_of(format.data_type).ok_or_else(|| {
                Error::format(format!("unknown GEOM vertex data type {}", format.data_type))
            })?;
        }
        if stride == 0 && vertex_count > 0 {
            return Err(Error::format(format!(
                "GEOM declares {vertex_count} vertices but no vertex formats"
            )));
        }
        if vertex_count < 0 || (vertex_count as usize).saturating_mul(stride) > r.remaining() {
            return Err(Error::format(format!(
                "GEOM vertex count {vertex_count} with stride {stride} does not fit in {} remaining bytes",
                r.remaining()
            )));
        }
        let vertex_count = vertex_count as usize;

        let mut vertices = Vec::with_capacity(vertex_count);
        for _ in 0..vertex_count {
            let vertex = vertex_formats
                .iter()
                .map(|format| VertexElement::read(format, &mut r))
                .collect::<Result<Vec<_>>>()?;
            vertices.push(vertex);
        }

        // Multiple face groups never occur in shipped meshes.
        let group_count = r.read_i32()?;
        if group_count != 1 {
            return Err(Error::format(format!("GEOM face group count {group_count}, expected 1")));
        }
        let bytes_per_face_point = r.read_u8()?;
        if bytes_per_face_point != 2 {
            return Err(Error::format(format!(
                "GEOM face indices of {bytes_per_face_point} bytes, expected 2"
            )));
        }
        let face_points = read_count(&mut r, 2, "face point")?;
        if face_points % 3 != 0 {
            return Err(Error::format(format!("GEOM face point count {face_points} is not a multiple of 3")));
        }
        let mut faces = Vec::with_capacity(face_points);
        for _ in 0..face_points {
            let index = r.read_u16()?;
            if index as usize >= vertex_count {
                return Err(Error::format(format!(
                    "GEOM face index {index} out of range ({vertex_count} vertices)"
                )));
            }
            faces.push(index);
        }

        let skin_index = if version == 0x05 { Some(r.read_i32()?) } else { None };

        let mut uv_stitches = Vec::new();
        let mut seam_stitches = Vec::new();
        if version == 0x0C {
            let count = read_count(&mut r, 8, "UV stitch")?;
            for _ in 0..count {
                let index = r.read_u32()?;
                let pair_count = read_count(&mut r, 8, "UV stitch pair")?;
                let mut pairs = Vec::with_capacity(pair_count);
                for _ in 0..pair_count {
                    pairs.push([r.read_f32()?, r.read_f32()?]);
                }
                uv_stitches.push(UvStitch { index, pairs });
            }

            let count = read_count(&mut r, 63, "seam stitch")?;
            for _ in 0..count {
                let index = r.read_u32()?;
                let vertex_id = r.read_u16()?;
                let unknown = [r.read_u16()?, r.read_u16()?];
                let mut values = [0f32; 13];
                for value in &mut values {
                    *value = r.read_f32()?;
                }
                let flags = r.read_u8()?;
                seam_stitches.push(SeamStitch { index, vertex_id, unknown, values, flags });
            }
        }

        let bone_count = read_count(&mut r, 4, "bone hash")?;
        let mut bone_hashes = Vec::with_capacity(bone_count);
        for _ in 0..bone_count {
            bone_hashes.push(r.read_u32()?);
        }

        if r.position() != tgi_offset {
            return Err(Error::format(format!(
                "GEOM v{version}: fields end at {} but key list starts at {tgi_offset}",
                r.position()
            )));
        }
        let tgi_count = read_count(&mut r, 16, "key")?;
        let mut tgi_list = Vec::with_capacity(tgi_count);
        for _ in 0..tgi_count {
            tgi_list.push(TGI::read_tgi(&mut r)?);
        }

        Ok(Self {
            version,
            tgi_offset,
            tgi_size,
            embedded_id,
            mtnf,
            merge_group,
            sort_order,
            vertex_formats,
            vertices,
            faces,
            skin_index,
            uv_stitches,
            seam_stitches,
            bone_hashes,
            tgi_list,
            raw_data: data.to_vec(),
        })
    }

    pub fn raw_data(&self) -> &[u8] {
        &self.raw_data
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangles(&self) -> impl Iterator<Item = [u16; 3]> + '_ {
        self.faces.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    fn has(&self, data_type: u32) -> bool {
        self.vertex_formats.iter().any(|f| f.data_type == data_type)
    }

    /// Flattened `x, y, z` per vertex.
    pub fn positions(&self) -> Vec<f32> {
        self.vertices
            .iter()
            .flat_map(|v| {
                v.iter()
                    .find_map(|e| match e {
                        VertexElement::Position(p) => Some(*p),
                        _ => None,
                    })
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Flattened `x, y, z` per vertex; empty when the mesh has no normals.
    pub fn normals(&self) -> Vec<f32> {
        if !self.has(usage::NORMAL) {
            return Vec::new();
        }
        self.vertices
            .iter()
            .flat_map(|v| {
                v.iter()
                    .find_map(|e| match e {
                        VertexElement::Normal(n) => Some(*n),
                        _ => None,
                    })
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Flattened `u, v` of the first UV channel; empty when the mesh has none.
    pub fn uvs(&self) -> Vec<f32> {
        if !self.has(usage::UV) {
            return Vec::new();
        }
        self.vertices
            .iter()
            .flat_map(|v| {
                v.iter()
                    .find_map(|e| match e {
                        VertexElement::Uv(uv) => Some(*uv),
                        _ => None,
                    })
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Renderer face records: per triangle a flag word, the three vertex
    /// indices, then the same indices again for each of the UV and normal
    /// channels present.
    pub fn face_records(&self) -> Vec<u32> {
        let has_uv = self.has(usage::UV);
        let has_normal = self.has(usage::NORMAL);
        let mut flags = 0;
        if has_uv {
            flags |= FACE_VERTEX_UV;
        }
        if has_normal {
            flags |= FACE_VERTEX_NORMAL;
        }
        let per_face = 4 + 3 * (has_uv as usize + has_normal as usize);

        let mut records = Vec::with_capacity(self.faces.len() / 3 * per_face);
        for [a, b, c] in self.triangles() {
            let tri = [u32::from(a), u32::from(b), u32::from(c)];
            records.push(flags);
            records.extend_from_slice(&tri);
            if has_uv {
                records.extend_from_slice(&tri);
            }
            if has_normal {
                records.extend_from_slice(&tri);
            }
        }
        records
    }
}
