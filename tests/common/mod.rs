//! Synthetic resource builders shared by the integration tests.
#![allow(dead_code)]

use s4pi_assets::codec::ByteWriter;
use s4pi_assets::TGI;

pub const GEOM_TYPE: u32 = 0x015A1849;
pub const CASP_TYPE: u32 = 0x034AEECB;

pub struct CasPartFixture {
    pub version: u32,
    pub name: String,
    pub keys: Vec<TGI>,
    /// One entry per LOD: the key table indices of its meshes.
    pub lods: Vec<Vec<u8>>,
    pub tag_count: u32,
    pub material_count: u8,
    pub preset_count: u32,
}

impl CasPartFixture {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            name: "yfTop_Tee".to_string(),
            keys: vec![
                TGI::new(GEOM_TYPE, 0, 0x1111_0000_0000_0001),
                TGI::new(0x3453CF95, 0, 0x2222_0000_0000_0002),
            ],
            lods: vec![vec![0]],
            tag_count: 2,
            material_count: 1,
            preset_count: 0,
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let v = self.version;
        let mut w = ByteWriter::new();
        w.write_u32(v);
        w.write_u32(0); // data size, patched below
        w.write_u32(self.preset_count);

        let name: Vec<u8> = self.name.encode_utf16().flat_map(|u| u.to_be_bytes()).collect();
        w.write_var_u7(name.len() as u32);
        w.write_bytes(&name);

        w.write_f32(1.5); // sort priority
        w.write_u16(3); // secondary sort index
        w.write_u32(0xAABBCCDD); // property id
        w.write_u32(0x0BADF00D); // aural material hash
        w.write_u8(0x11); // param flags
        if v >= 39 {
            w.write_u8(0x22);
        }
        w.write_u64(0x0102030405060708);
        if v >= 41 {
            w.write_u64(0x1112131415161718);
        }
        if v >= 36 {
            w.write_u64(0xFFFF_0000_FFFF_0000);
        } else {
            w.write_u32(0xFFFF_0000);
        }

        w.write_u32(self.tag_count);
        for i in 0..self.tag_count {
            w.write_u16(0x40 + i as u16);
            if v >= 37 {
                w.write_u32(0x1000 + i);
            } else {
                w.write_u16(0x1000 + i as u16);
            }
        }

        w.write_u32(250); // deprecated price
        w.write_u32(0x5151); // title key
        w.write_u32(0x5252); // description key
        w.write_u8(0); // unique texture space
        w.write_i32(6); // body type
        w.write_i32(0); // body sub type
        w.write_u32(0x2002); // age/gender
        if v >= 0x20 {
            w.write_u32(1);
        }
        if v >= 34 {
            w.write_i16(0);
            w.write_u8(0);
            w.write_bytes(&[0; 9]);
        } else {
            w.write_u8(0);
        }

        w.write_u8(2);
        w.write_u32(0xFF112233);
        w.write_u32(0xFF445566);

        w.write_u8(1); // buff key
        w.write_u8(1); // variant thumbnail key
        if v >= 0x1C {
            w.write_u64(0xCAFE);
        }
        if v >= 0x1E {
            w.write_u8(self.material_count);
            if self.material_count > 0 {
                w.write_u32(10);
                w.write_u32(20);
                w.write_u32(30);
            }
        }
        if v >= 0x1F {
            w.write_u32(0x4);
        }
        if v >= 38 {
            w.write_u64(0x9999);
        }
        if v >= 39 {
            w.write_u64(0x8888);
        }

        w.write_u8(1); // naked key
        w.write_u8(1); // parent key
        w.write_i32(16000); // sort layer

        w.write_u8(self.lods.len() as u8);
        for (level, indices) in self.lods.iter().enumerate() {
            w.write_u8(level as u8);
            w.write_u32(0);
            w.write_u8(1);
            w.write_u32(0x1A);
            w.write_u32(0x2B);
            w.write_u32(0x3C);
            w.write_u8(indices.len() as u8);
            w.write_bytes(indices);
        }

        w.write_u8(1); // slot keys
        w.write_u8(1);

        w.write_u8(1); // diffuse shadow
        w.write_u8(1); // shadow
        w.write_u8(2); // composition method
        w.write_u8(1); // region map
        w.write_u8(1);
        w.write_u8(3);
        w.write_f32(0.25);
        w.write_u8(1); // normal map
        w.write_u8(1); // specular map
        if v >= 0x1B {
            w.write_u32(0);
        }
        if v >= 42 {
            w.write_u8(1);
        }

        let tgi_offset = w.position();
        w.write_u8(self.keys.len() as u8);
        for key in &self.keys {
            key.write_igt(&mut w);
        }

        w.seek(4).unwrap();
        w.write_u32(tgi_offset as u32 - 8);
        w.into_inner()
    }
}

/// Vertex formats as (data type, sub type, bytes per element).
pub const POSITION: (u32, u32, u8) = (1, 1, 12);
pub const NORMAL: (u32, u32, u8) = (2, 1, 12);
pub const UV: (u32, u32, u8) = (3, 1, 8);
pub const BONES: (u32, u32, u8) = (4, 2, 4);
pub const WEIGHTS: (u32, u32, u8) = (5, 2, 4);
pub const TANGENT: (u32, u32, u8) = (6, 1, 12);
pub const COLOR: (u32, u32, u8) = (7, 2, 4);
pub const VERTEX_ID: (u32, u32, u8) = (10, 4, 4);

pub struct GeomFixture {
    pub version: u32,
    pub mtnf: Option<Vec<u8>>,
    pub formats: Vec<(u32, u32, u8)>,
    pub vertex_count: i32,
    pub group_count: i32,
    pub bytes_per_face_index: u8,
    pub faces: Vec<u16>,
    pub bones: Vec<u32>,
    pub keys: Vec<TGI>,
}

impl GeomFixture {
    /// A quad: four vertices, two triangles.
    pub fn quad(version: u32) -> Self {
        Self {
            version,
            mtnf: None,
            formats: vec![POSITION, NORMAL, UV, BONES, WEIGHTS, TANGENT, COLOR, VERTEX_ID],
            vertex_count: 4,
            group_count: 1,
            bytes_per_face_index: 2,
            faces: vec![0, 1, 2, 2, 1, 3],
            bones: vec![0xB0B0_0001, 0xB0B0_0002],
            keys: vec![TGI::new(0x0354796A, 0, 0x77)],
        }
    }

    pub fn position(i: usize) -> [f32; 3] {
        [i as f32, 2.0 * i as f32, -(i as f32)]
    }

    pub fn uv(i: usize) -> [f32; 2] {
        [0.25 * i as f32, 0.5]
    }

    pub fn build(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_fourcc(b"GEOM");
        w.write_u32(self.version);
        w.write_u32(0); // key list offset, patched below
        w.write_u32(4 + 16 * self.keys.len() as u32);
        match &self.mtnf {
            Some(blob) => {
                w.write_u32(0x4D544E46);
                w.write_u32(blob.len() as u32);
                w.write_bytes(blob);
            }
            None => w.write_u32(0),
        }
        w.write_u32(0); // merge group
        w.write_u32(1); // sort order

        w.write_i32(self.vertex_count);
        w.write_i32(self.formats.len() as i32);
        for &(data_type, sub_type, size) in &self.formats {
            w.write_u32(data_type);
            w.write_u32(sub_type);
            w.write_u8(size);
        }
        for i in 0..self.vertex_count.max(0) as usize {
            for &(data_type, _, _) in &self.formats {
                match data_type {
                    1 => Self::position(i).iter().for_each(|v| w.write_f32(*v)),
                    2 | 6 => [0.0, 0.0, 1.0].iter().for_each(|v| w.write_f32(*v)),
                    3 => Self::uv(i).iter().for_each(|v| w.write_f32(*v)),
                    _ => w.write_u32(i as u32),
                }
            }
        }

        w.write_i32(self.group_count);
        w.write_u8(self.bytes_per_face_index);
        w.write_i32(self.faces.len() as i32);
        for &index in &self.faces {
            w.write_u16(index);
        }

        if self.version == 5 {
            w.write_i32(0);
        }
        if self.version == 12 {
            w.write_i32(1);
            w.write_u32(9);
            w.write_i32(2);
            for v in [0.1f32, 0.2, 0.3, 0.4] {
                w.write_f32(v);
            }
            w.write_i32(1);
            w.write_u32(5);
            w.write_u16(3);
            w.write_u16(0);
            w.write_u16(0);
            for i in 0..13 {
                w.write_f32(i as f32);
            }
            w.write_u8(1);
        }

        w.write_i32(self.bones.len() as i32);
        for &bone in &self.bones {
            w.write_u32(bone);
        }

        let tgi_offset = w.position();
        w.write_i32(self.keys.len() as i32);
        for key in &self.keys {
            key.write_tgi(&mut w);
        }

        w.seek(8).unwrap();
        w.write_u32(tgi_offset as u32 - 12);
        w.into_inner()
    }
}

/// Wraps chunks in an RCOL container.
pub fn rcol(chunks: &[(TGI, Vec<u8>)], externals: &[TGI]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.write_u32(3);
    w.write_i32(chunks.len() as i32);
    w.write_u32(0);
    w.write_i32(externals.len() as i32);
    w.write_i32(chunks.len() as i32);
    for (tgi, _) in chunks {
        tgi.write_itg(&mut w);
    }
    for tgi in externals {
        tgi.write_itg(&mut w);
    }
    let mut position = w.position() + 8 * chunks.len();
    for (_, data) in chunks {
        w.write_u32(position as u32);
        w.write_i32(data.len() as i32);
        position += data.len();
    }
    for (_, data) in chunks {
        w.write_bytes(data);
    }
    w.into_inner()
}

/// Builds an RLE2 texture with a single mip level from raw command and lane bytes.
pub fn rle2_single_level(
    width: u16,
    height: u16,
    commands: &[u16],
    lanes: [&[u8]; 4],
) -> Vec<u8> {
    let command_bytes: Vec<u8> = commands.iter().flat_map(|c| c.to_le_bytes()).collect();
    let start = 16 + 20;
    let command_offset = start;
    let lane2 = command_offset + command_bytes.len();
    let lane3 = lane2 + lanes[2].len();
    let lane0 = lane3 + lanes[3].len();
    let lane1 = lane0 + lanes[0].len();

    let mut w = ByteWriter::new();
    w.write_fourcc(b"DXT5");
    w.write_fourcc(b"RLE2");
    w.write_u16(width);
    w.write_u16(height);
    w.write_u16(1);
    w.write_u16(0);
    for offset in [command_offset, lane2, lane3, lane0, lane1] {
        w.write_u32(offset as u32);
    }
    w.write_bytes(&command_bytes);
    w.write_bytes(lanes[2]);
    w.write_bytes(lanes[3]);
    w.write_bytes(lanes[0]);
    w.write_bytes(lanes[1]);
    w.into_inner()
}
