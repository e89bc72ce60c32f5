//! CAS part descriptor (0x034AEECB).
//!
//! The layout is a strictly sequential field list where individual fields
//! appear or change width at specific format versions. Every gate below is
//! the version at which the field was introduced.

use log::trace;

use super::{Resource, GEOM};
use crate::codec::ByteReader;
use crate::error::{Error, Result};
use crate::package::index::TGI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CasTag {
    pub category: u16,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackInfo {
    /// Version 34 and later.
    Pack { id: i16, flags: u8, reserved: [u8; 9] },
    Legacy { unused2: u8, unused3: Option<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LodBlock {
    pub level: u8,
    pub unused: u32,
    /// Sorting, specular level and cast shadow per asset.
    pub assets: Vec<[u32; 3]>,
    /// Indices into the trailing key table, validated on use.
    pub key_indices: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionOverride {
    pub region: u8,
    pub layer: f32,
}

/// Byte indices into the key table for the part's texture maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureKeys {
    pub diffuse_shadow: u8,
    pub shadow: u8,
    pub region_map: u8,
    pub normal_map: u8,
    pub specular_map: u8,
    pub emission_map: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct CasPartResource {
    pub version: u32,
    /// Absolute offset of the key table, fixed by the data size field.
    pub tgi_offset: usize,
    pub preset_count: u32,
    pub name: String,
    pub sort_priority: f32,
    pub secondary_sort_index: u16,
    pub property_id: u32,
    pub aural_material_hash: u32,
    pub param_flags: u8,
    pub param_flags2: Option<u8>,
    pub exclude_part_flags: u64,
    pub exclude_part_flags2: Option<u64>,
    /// Stored as 32 bits before version 36.
    pub exclude_modifier_region_flags: u64,
    pub tags: Vec<CasTag>,
    pub deprecated_price: u32,
    pub part_title_key: u32,
    pub part_description_key: u32,
    pub unique_texture_space: u8,
    pub body_type: i32,
    pub body_sub_type: i32,
    pub age_gender: u32,
    pub reserved1: Option<u32>,
    pub pack: PackInfo,
    pub swatch_colors: Vec<u32>,
    pub buff_res_key: u8,
    pub variant_thumbnail_key: u8,
    pub voice_effect_hash: Option<u64>,
    pub used_material_count: Option<u8>,
    /// Upper body, lower body and shoes material set hashes.
    pub material_set_hashes: Option<[u32; 3]>,
    pub hide_for_occult_flags: Option<u32>,
    pub opposite_gender_part: Option<u64>,
    pub fallback_part: Option<u64>,
    pub naked_key: u8,
    pub parent_key: u8,
    pub sort_layer: i32,
    pub lods: Vec<LodBlock>,
    pub slot_keys: Vec<u8>,
    pub composition_method: u8,
    pub overrides: Vec<RegionOverride>,
    pub texture_keys: TextureKeys,
    pub shared_uv_map_space: Option<u32>,
    pub tgi_list: Vec<TGI>,
    raw_data: Vec<u8>,
}

impl CasPartResource {
    pub fn raw_data(&self) -> &[u8] {
        &self.raw_data
    }

    /// Resolves the mesh keys of the LOD at `lod_index` against the key table.
    pub fn mesh_keys(&self, lod_index: usize) -> Result<Vec<TGI>> {
        let lod = self.lods.get(lod_index).ok_or_else(|| {
            Error::format(format!(
                "CAS part has {} LODs, LOD {} requested",
                self.lods.len(),
                lod_index
            ))
        })?;

        lod.key_indices
            .iter()
            .map(|&index| {
                let tgi = self.tgi_list.get(index as usize).ok_or_else(|| {
                    Error::format(format!(
                        "LOD {} key index {} out of range ({} keys)",
                        lod.level,
                        index,
                        self.tgi_list.len()
                    ))
                })?;
                if tgi.res_type != GEOM {
                    return Err(Error::format(format!(
                        "LOD {} key index {} refers to {}, not a GEOM",
                        lod.level, index, tgi
                    )));
                }
                Ok(*tgi)
            })
            .collect()
    }

    /// Looks up a texture key index in the key table.
    pub fn texture_key(&self, index: u8) -> Option<&TGI> {
        self.tgi_list.get(index as usize)
    }
}

/// Names are a 7-bit byte length followed by UTF-16BE code units.
fn read_name(reader: &mut ByteReader<'_>) -> Result<String> {
    let len = reader.read_var_u7()? as usize;
    if len % 2 != 0 {
        return Err(Error::format(format!("odd UTF-16 name length {len}")));
    }
    let bytes = reader.read_slice(len)?;
    let units = bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]]));
    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .map_err(|e| Error::format(format!("invalid CAS part name: {e}")))
}

fn read_lod(reader: &mut ByteReader<'_>) -> Result<LodBlock> {
    let level = reader.read_u8()?;
    let unused = reader.read_u32()?;
    let asset_count = reader.read_u8()?;
    let mut assets = Vec::with_capacity(asset_count as usize);
    for _ in 0..asset_count {
        assets.push([reader.read_u32()?, reader.read_u32()?, reader.read_u32()?]);
    }
    let key_count = reader.read_u8()?;
    let key_indices = reader.read_bytes(key_count as usize)?;
    Ok(LodBlock {
        level,
        unused,
        assets,
        key_indices,
    })
}

impl Resource for CasPartResource {
    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data);

        let version = r.read_u32()?;
        let tgi_offset = (r.read_u32()? as usize).saturating_add(8);
        if tgi_offset > data.len() {
            return Err(Error::format(format!(
                "CAS part v{version}: key table offset {tgi_offset} past end of {} bytes",
                data.len()
            )));
        }
        let preset_count = r.read_u32()?;
        if preset_count != 0 {
            return Err(Error::unsupported(format!(
                "CAS part v{version} with {preset_count} presets"
            )));
        }
        let name = read_name(&mut r)?;
        let sort_priority = r.read_f32()?;
        let secondary_sort_index = r.read_u16()?;
        let property_id = r.read_u32()?;
        let aural_material_hash = r.read_u32()?;
        let param_flags = r.read_u8()?;
        let param_flags2 = if version >= 39 { Some(r.read_u8()?) } else { None };
        let exclude_part_flags = r.read_u64()?;
        let exclude_part_flags2 = if version >= 41 { Some(r.read_u64()?) } else { None };
        let exclude_modifier_region_flags = if version >= 36 {
            r.read_u64()?
        } else {
            u64::from(r.read_u32()?)
        };

        let tag_count = r.read_u32()? as usize;
        let tag_width = if version >= 37 { 6 } else { 4 };
        if tag_count.saturating_mul(tag_width) > r.remaining() {
            return Err(Error::format(format!(
                "CAS part v{version}: {tag_count} tags exceed remaining {} bytes",
                r.remaining()
            )));
        }
        let mut tags = Vec::with_capacity(tag_count);
        for _ in 0..tag_count {
            let category = r.read_u16()?;
            let value = if version >= 37 {
                r.read_u32()?
            } else {
                u32::from(r.read_u16()?)
            };
            tags.push(CasTag { category, value });
        }

        let deprecated_price = r.read_u32()?;
        let part_title_key = r.read_u32()?;
        let part_description_key = r.read_u32()?;
        let unique_texture_space = r.read_u8()?;
        let body_type = r.read_i32()?;
        let body_sub_type = r.read_i32()?;
        let age_gender = r.read_u32()?;
        let reserved1 = if version >= 0x20 { Some(r.read_u32()?) } else { None };
        let pack = if version >= 34 {
            let id = r.read_i16()?;
            let flags = r.read_u8()?;
            let mut reserved = [0u8; 9];
            reserved.copy_from_slice(r.read_slice(9)?);
            PackInfo::Pack { id, flags, reserved }
        } else {
            let unused2 = r.read_u8()?;
            let unused3 = if unused2 > 0 { Some(r.read_u8()?) } else { None };
            PackInfo::Legacy { unused2, unused3 }
        };

        let color_count = r.read_u8()?;
        let mut swatch_colors = Vec::with_capacity(color_count as usize);
        for _ in 0..color_count {
            swatch_colors.push(r.read_u32()?);
        }

        let buff_res_key = r.read_u8()?;
        let variant_thumbnail_key = r.read_u8()?;
        let voice_effect_hash = if version >= 0x1C { Some(r.read_u64()?) } else { None };
        let (used_material_count, material_set_hashes) = if version >= 0x1E {
            let count = r.read_u8()?;
            let hashes = if count > 0 {
                Some([r.read_u32()?, r.read_u32()?, r.read_u32()?])
            } else {
                None
            };
            (Some(count), hashes)
        } else {
            (None, None)
        };
        let hide_for_occult_flags = if version >= 0x1F { Some(r.read_u32()?) } else { None };
        let opposite_gender_part = if version >= 38 { Some(r.read_u64()?) } else { None };
        let fallback_part = if version >= 39 { Some(r.read_u64()?) } else { None };

        let naked_key = r.read_u8()?;
        let parent_key = r.read_u8()?;
        let sort_layer = r.read_i32()?;

        let lod_count = r.read_u8()?;
        let mut lods = Vec::with_capacity(lod_count as usize);
        for _ in 0..lod_count {
            lods.push(read_lod(&mut r)?);
        }

        let slot_count = r.read_u8()?;
        let slot_keys = r.read_bytes(slot_count as usize)?;

        let diffuse_shadow = r.read_u8()?;
        let shadow = r.read_u8()?;
        let composition_method = r.read_u8()?;
        let region_map = r.read_u8()?;
        let override_count = r.read_u8()?;
        let mut overrides = Vec::with_capacity(override_count as usize);
        for _ in 0..override_count {
            let region = r.read_u8()?;
            let layer = r.read_f32()?;
            overrides.push(RegionOverride { region, layer });
        }
        let normal_map = r.read_u8()?;
        let specular_map = r.read_u8()?;
        let shared_uv_map_space = if version >= 0x1B { Some(r.read_u32()?) } else { None };
        let emission_map = if version >= 42 { Some(r.read_u8()?) } else { None };

        if r.position() != tgi_offset {
            return Err(Error::format(format!(
                "CAS part v{version}: fields end at {} but key table starts at {tgi_offset}",
                r.position()
            )));
        }

        let tgi_count = r.read_u8()?;
        let mut tgi_list = Vec::with_capacity(tgi_count as usize);
        for _ in 0..tgi_count {
            tgi_list.push(TGI::read_igt(&mut r)?);
        }
        trace!("CAS part {name:?} v{version}: {} LODs, {} keys", lods.len(), tgi_list.len());

        Ok(Self {
            version,
            tgi_offset,
            preset_count,
            name,
            sort_priority,
            secondary_sort_index,
            property_id,
            aural_material_hash,
            param_flags,
            param_flags2,
            exclude_part_flags,
            exclude_part_flags2,
            exclude_modifier_region_flags,
            tags,
            deprecated_price,
            part_title_key,
            part_description_key,
            unique_texture_space,
            body_type,
            body_sub_type,
            age_gender,
            reserved1,
            pack,
            swatch_colors,
            buff_res_key,
            variant_thumbnail_key,
            voice_effect_hash,
            used_material_count,
            material_set_hashes,
            hide_for_occult_flags,
            opposite_gender_part,
            fallback_part,
            naked_key,
            parent_key,
            sort_layer,
            lods,
            slot_keys,
            composition_method,
            overrides,
            texture_keys: TextureKeys {
                diffuse_shadow,
                shadow,
                region_map,
                normal_map,
                specular_map,
                emission_map,
            },
            shared_uv_map_space,
            tgi_list,
            raw_data: data.to_vec(),
        })
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.raw_data.clone())
    }
}
