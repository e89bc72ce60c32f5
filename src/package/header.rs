use binrw::binrw;

#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[br(little)]
#[bw(little)]
pub struct PackageHeader {
    pub magic: [u8; 4],     // "DBPF"
    pub major: i32,         // Usually 2
    pub minor: i32,         // Usually 1
    pub reserved1: [u8; 24],
    pub index_count: i32,
    pub reserved2: u32,
    pub index_size: i32,
    pub reserved3: [u8; 12],
    pub index_version: i32, // Usually 3
    pub index_position: i32,
    pub reserved4: [u8; 28],
}

impl Default for PackageHeader {
    fn default() -> Self {
        Self {
            magic: Self::MAGIC,
            major: 2,
            minor: 1,
            reserved1: [0; 24],
            index_count: 0,
            reserved2: 0,
            index_size: 0,
            reserved3: [0; 12],
            index_version: 3,
            index_position: 0,
            reserved4: [0; 28],
        }
    }
}

impl PackageHeader {
    pub const SIZE: usize = 96;
    pub const MAGIC: [u8; 4] = *b"DBPF";

    pub fn is_valid(&self) -> bool {
        self.magic == Self::MAGIC
    }

    pub fn read<R: std::io::Read + std::io::Seek>(reader: &mut R) -> Result<Self, binrw::Error> {
        use binrw::BinReaderExt;
        reader.read_le()
    }

    pub fn write<W: std::io::Write + std::io::Seek>(&self, writer: &mut W) -> Result<(), binrw::Error> {
        use binrw::BinWriterExt;
        writer.write_le(self)
    }
}
