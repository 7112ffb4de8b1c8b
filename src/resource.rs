//! Resource directory tree.
//!
//! A resource directory is a tree of tables. Each table entry is keyed by a
//! numeric ID or a name and points either to a subtable or to a leaf
//! descriptor that locates the resource bytes by virtual address. By
//! convention the tree has three levels: type, name, language.
//!
//! All internal offsets are relative to the start of the directory, so the
//! decoder works on the directory's own bytes through a [`SliceReader`]. Leaf
//! data addresses are virtual and are rebased with the virtual address of the
//! first directory byte.
//!
//! # Examples
//!
//! ```
//! use peimage::resource::{ResourceDirectory, ResourceId};
//!
//! let mut root = ResourceDirectory::default();
//! root.add_data(
//!     &[ResourceId::Id(24), ResourceId::Id(1), ResourceId::Id(0x409)],
//!     b"<assembly/>".to_vec(),
//! );
//! let bytes = root.encode(0x3000);
//! let parsed = ResourceDirectory::decode(&bytes, 0x3000)?;
//! assert_eq!(parsed, root);
//! # Ok::<(), peimage::Error>(())
//! ```

use std::collections::HashSet;
use std::io::Write;

use log::warn;

use crate::layout::align_up;
use crate::reader::{DataReader, SliceReader};
use crate::writer::{wide_len, DataWriter};
use crate::{Error, Result};

/// High bit of an entry word: named key, or subdirectory target.
const HIGH_BIT: u32 = 0x8000_0000;

/// Nesting limit for hostile inputs; real trees have three levels.
const MAX_DEPTH: usize = 32;

/// Offsets already decoded and the leaf bytes still allowed.
struct Visited {
    tables: HashSet<u32>,
    leaves: HashSet<u32>,
    leaf_budget: usize,
}

impl Visited {
    fn new(len: usize) -> Self {
        Self {
            tables: HashSet::from([0u32]),
            leaves: HashSet::new(),
            leaf_budget: len,
        }
    }
}

/// Alignment of leaf data blocks in encoded output.
const DATA_ALIGNMENT: u32 = 8;

/// Standard resource types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ResourceType {
    Cursor = 1,
    Bitmap = 2,
    Icon = 3,
    Menu = 4,
    Dialog = 5,
    String = 6,
    RcData = 10,
    GroupCursor = 12,
    GroupIcon = 14,
    Version = 16,
    Manifest = 24,
}

impl ResourceType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Cursor),
            2 => Some(Self::Bitmap),
            3 => Some(Self::Icon),
            4 => Some(Self::Menu),
            5 => Some(Self::Dialog),
            6 => Some(Self::String),
            10 => Some(Self::RcData),
            12 => Some(Self::GroupCursor),
            14 => Some(Self::GroupIcon),
            16 => Some(Self::Version),
            24 => Some(Self::Manifest),
            _ => None,
        }
    }
}

/// Entry key: a numeric ID or a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Id(u32),
    Name(String),
}

impl ResourceId {
    /// The standard resource type this key denotes at the top level.
    pub fn as_resource_type(&self) -> Option<ResourceType> {
        match self {
            Self::Id(id) => ResourceType::from_u32(*id),
            Self::Name(_) => None,
        }
    }

    fn is_named(&self) -> bool {
        matches!(self, Self::Name(_))
    }
}

/// IMAGE_RESOURCE_DIRECTORY. The entry counts are recomputed on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceDirectoryTable {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub number_of_named_entries: u16,
    pub number_of_id_entries: u16,
}

impl ResourceDirectoryTable {
    pub const SIZE: usize = 16;

    pub fn read_from<R: DataReader>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            characteristics: reader.read_u32()?,
            time_date_stamp: reader.read_u32()?,
            major_version: reader.read_u16()?,
            minor_version: reader.read_u16()?,
            number_of_named_entries: reader.read_u16()?,
            number_of_id_entries: reader.read_u16()?,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut DataWriter<W>) -> Result<()> {
        writer.write_u32(self.characteristics)?;
        writer.write_u32(self.time_date_stamp)?;
        writer.write_u16(self.major_version)?;
        writer.write_u16(self.minor_version)?;
        writer.write_u16(self.number_of_named_entries)?;
        writer.write_u16(self.number_of_id_entries)
    }

    pub fn total_entries(&self) -> usize {
        usize::from(self.number_of_named_entries) + usize::from(self.number_of_id_entries)
    }
}

/// Leaf of the tree: resource bytes and their code page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceData {
    pub data: Vec<u8>,
    pub code_page: u32,
    pub reserved: u32,
}

impl ResourceData {
    /// Size of the leaf descriptor (IMAGE_RESOURCE_DATA_ENTRY).
    pub const DESCRIPTOR_SIZE: usize = 16;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceNode {
    Directory(ResourceDirectory),
    Data(ResourceData),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub id: ResourceId,
    pub node: ResourceNode,
}

impl ResourceEntry {
    /// Size of a table entry.
    pub const SIZE: usize = 8;
}

/// A resource table and its entries, recursively.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceDirectory {
    pub table: ResourceDirectoryTable,
    pub entries: Vec<ResourceEntry>,
}

impl ResourceDirectory {
    /// Decode the tree rooted at the start of `bytes`. `base_va` is the virtual
    /// address of `bytes[0]`.
    ///
    /// Entries whose offsets fall outside `bytes`, whose leaf data is
    /// truncated, or that lead back into a table or leaf descriptor already
    /// visited are dropped; their siblings are still decoded. Decoded leaf data
    /// never exceeds `bytes.len()` in total.
    pub fn decode(bytes: &[u8], base_va: u32) -> Result<Self> {
        let mut reader = SliceReader::new(bytes);
        let mut visited = Visited::new(bytes.len());
        Self::read_table(&mut reader, base_va, &mut visited, 0)
    }

    fn read_table(
        reader: &mut SliceReader<'_>,
        base_va: u32,
        visited: &mut Visited,
        depth: usize,
    ) -> Result<Self> {
        let table = ResourceDirectoryTable::read_from(reader)?;
        let mut entries = Vec::new();
        for _ in 0..table.total_entries() {
            let key = reader.read_u32()?;
            let value = reader.read_u32()?;
            let resume = reader.position() as i64;
            match Self::read_entry(reader, key, value, base_va, visited, depth) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("skipping resource entry {key:#x} -> {value:#x}: {e}"),
            }
            reader.seek(resume)?;
        }
        Ok(Self { table, entries })
    }

    fn read_entry(
        reader: &mut SliceReader<'_>,
        key: u32,
        value: u32,
        base_va: u32,
        visited: &mut Visited,
        depth: usize,
    ) -> Result<ResourceEntry> {
        let id = if key & HIGH_BIT != 0 {
            reader.seek(i64::from(key & !HIGH_BIT))?;
            // Names are a u16 length in code units followed by the units.
            let len = reader.read_u16()?;
            ResourceId::Name(reader.read_fixed_wide(usize::from(len))?)
        } else {
            ResourceId::Id(key)
        };

        let offset = value & !HIGH_BIT;
        let node = if value & HIGH_BIT != 0 {
            if depth + 1 >= MAX_DEPTH {
                return Err(Error::malformed("resource directory", "nesting too deep"));
            }
            if !visited.tables.insert(offset) {
                return Err(Error::malformed(
                    "resource directory",
                    format!("table at {offset:#x} is referenced twice"),
                ));
            }
            reader.seek(i64::from(offset))?;
            ResourceNode::Directory(Self::read_table(reader, base_va, visited, depth + 1)?)
        } else {
            if !visited.leaves.insert(offset) {
                return Err(Error::malformed(
                    "resource directory",
                    format!("leaf descriptor at {offset:#x} is referenced twice"),
                ));
            }
            reader.seek(i64::from(offset))?;
            let data_rva = reader.read_u32()?;
            let size = reader.read_u32()? as usize;
            let code_page = reader.read_u32()?;
            let reserved = reader.read_u32()?;
            if size > visited.leaf_budget {
                return Err(Error::malformed(
                    "resource directory",
                    format!("leaf of {size:#x} bytes exceeds the directory"),
                ));
            }
            reader.seek(i64::from(data_rva) - i64::from(base_va))?;
            let data = reader.read_bytes(size)?;
            visited.leaf_budget -= size;
            ResourceNode::Data(ResourceData {
                data,
                code_page,
                reserved,
            })
        };

        Ok(ResourceEntry { id, node })
    }

    /// Encode with a canonical layout: all tables breadth-first, then leaf
    /// descriptors, then names, then leaf data on 8-byte boundaries.
    pub fn encode(&self, base_va: u32) -> Vec<u8> {
        let layout = Layout::compute(self);
        let mut writer = DataWriter::new(Vec::with_capacity(layout.total as usize));
        layout
            .write_to(&mut writer, base_va)
            .expect("writing to a Vec cannot fail");
        writer.into_inner()
    }

    fn recount(&mut self) {
        let named = self.entries.iter().filter(|e| e.id.is_named()).count();
        self.table.number_of_named_entries = named as u16;
        self.table.number_of_id_entries = (self.entries.len() - named) as u16;
    }

    /// Insert a leaf at `path`, creating intermediate tables as needed.
    /// An existing leaf at the same path is replaced.
    pub fn add_data(&mut self, path: &[ResourceId], data: Vec<u8>) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut dir = self;
        for id in parents {
            let pos = match dir
                .entries
                .iter()
                .position(|e| e.id == *id && matches!(e.node, ResourceNode::Directory(_)))
            {
                Some(pos) => pos,
                None => {
                    dir.entries.push(ResourceEntry {
                        id: id.clone(),
                        node: ResourceNode::Directory(ResourceDirectory::default()),
                    });
                    dir.recount();
                    dir.entries.len() - 1
                }
            };
            dir = match &mut dir.entries[pos].node {
                ResourceNode::Directory(sub) => sub,
                ResourceNode::Data(_) => return,
            };
        }
        let leaf = ResourceNode::Data(ResourceData {
            data,
            ..ResourceData::default()
        });
        match dir.entries.iter().position(|e| e.id == *last) {
            Some(pos) => dir.entries[pos].node = leaf,
            None => {
                dir.entries.push(ResourceEntry {
                    id: last.clone(),
                    node: leaf,
                });
                dir.recount();
            }
        }
    }

    /// Entry with the given key in this table.
    pub fn find(&self, id: &ResourceId) -> Option<&ResourceEntry> {
        self.entries.iter().find(|e| e.id == *id)
    }

    /// Every leaf, depth-first, with the keys leading to it.
    pub fn leaves(&self) -> Vec<(Vec<&ResourceId>, &ResourceData)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut Vec::new(), &mut out);
        out
    }

    fn collect_leaves<'a>(
        &'a self,
        path: &mut Vec<&'a ResourceId>,
        out: &mut Vec<(Vec<&'a ResourceId>, &'a ResourceData)>,
    ) {
        for entry in &self.entries {
            path.push(&entry.id);
            match &entry.node {
                ResourceNode::Directory(sub) => sub.collect_leaves(path, out),
                ResourceNode::Data(leaf) => out.push((path.clone(), leaf)),
            }
            path.pop();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Offsets of every part of an encoded tree.
struct Layout<'a> {
    dirs: Vec<&'a ResourceDirectory>,
    table_offsets: Vec<u32>,
    leaves: Vec<&'a ResourceData>,
    descriptors_start: u32,
    names: Vec<&'a str>,
    name_offsets: Vec<u32>,
    names_end: u32,
    data_offsets: Vec<u32>,
    total: u32,
}

impl<'a> Layout<'a> {
    fn compute(root: &'a ResourceDirectory) -> Self {
        let mut dirs = vec![root];
        let mut i = 0;
        while i < dirs.len() {
            let current = dirs[i];
            dirs.extend(current.entries.iter().filter_map(|e| match &e.node {
                ResourceNode::Directory(d) => Some(d),
                ResourceNode::Data(_) => None,
            }));
            i += 1;
        }

        let mut offset = 0u32;
        let mut table_offsets = Vec::with_capacity(dirs.len());
        for dir in &dirs {
            table_offsets.push(offset);
            offset += (ResourceDirectoryTable::SIZE + dir.entries.len() * ResourceEntry::SIZE) as u32;
        }

        let leaves: Vec<&ResourceData> = dirs
            .iter()
            .flat_map(|d| d.entries.iter())
            .filter_map(|e| match &e.node {
                ResourceNode::Data(leaf) => Some(leaf),
                ResourceNode::Directory(_) => None,
            })
            .collect();
        let descriptors_start = offset;
        offset += (leaves.len() * ResourceData::DESCRIPTOR_SIZE) as u32;

        let names: Vec<&str> = dirs
            .iter()
            .flat_map(|d| d.entries.iter())
            .filter_map(|e| match &e.id {
                ResourceId::Name(name) => Some(name.as_str()),
                ResourceId::Id(_) => None,
            })
            .collect();
        let mut name_offsets = Vec::with_capacity(names.len());
        for name in &names {
            name_offsets.push(offset);
            offset += 2 + 2 * name_units(name) as u32;
        }
        let names_end = offset;

        let mut data_offsets = Vec::with_capacity(leaves.len());
        offset = align_up(offset, DATA_ALIGNMENT);
        for leaf in &leaves {
            data_offsets.push(offset);
            offset = align_up(offset + leaf.data.len() as u32, DATA_ALIGNMENT);
        }

        Self {
            dirs,
            table_offsets,
            leaves,
            descriptors_start,
            names,
            name_offsets,
            names_end,
            data_offsets,
            total: offset,
        }
    }

    fn write_to<W: Write>(&self, w: &mut DataWriter<W>, base_va: u32) -> Result<()> {
        let mut next_table = 1;
        let mut next_leaf = 0;
        let mut next_name = 0;
        for dir in &self.dirs {
            let named = dir.entries.iter().filter(|e| e.id.is_named()).count();
            let table = ResourceDirectoryTable {
                number_of_named_entries: named as u16,
                number_of_id_entries: (dir.entries.len() - named) as u16,
                ..dir.table
            };
            table.write_to(w)?;

            for entry in &dir.entries {
                let key = match &entry.id {
                    ResourceId::Id(id) => *id,
                    ResourceId::Name(_) => {
                        next_name += 1;
                        HIGH_BIT | self.name_offsets[next_name - 1]
                    }
                };
                let value = match &entry.node {
                    ResourceNode::Directory(_) => {
                        next_table += 1;
                        HIGH_BIT | self.table_offsets[next_table - 1]
                    }
                    ResourceNode::Data(_) => {
                        next_leaf += 1;
                        self.descriptors_start
                            + ((next_leaf - 1) * ResourceData::DESCRIPTOR_SIZE) as u32
                    }
                };
                w.write_u32(key)?;
                w.write_u32(value)?;
            }
        }

        for (leaf, data_offset) in self.leaves.iter().zip(&self.data_offsets) {
            w.write_u32(base_va.wrapping_add(*data_offset))?;
            w.write_u32(leaf.data.len() as u32)?;
            w.write_u32(leaf.code_page)?;
            w.write_u32(leaf.reserved)?;
        }

        for name in &self.names {
            let units: Vec<u16> = name.encode_utf16().take(name_units(name)).collect();
            w.write_u16(units.len() as u16)?;
            for unit in units {
                w.write_u16(unit)?;
            }
        }
        w.write_zeros(u64::from(align_up(self.names_end, DATA_ALIGNMENT) - self.names_end))?;

        for (leaf, data_offset) in self.leaves.iter().zip(&self.data_offsets) {
            w.write_bytes(&leaf.data)?;
            let end = data_offset + leaf.data.len() as u32;
            w.write_zeros(u64::from(align_up(end, DATA_ALIGNMENT) - end))?;
        }
        Ok(())
    }
}

fn name_units(name: &str) -> usize {
    wide_len(name).min(usize::from(u16::MAX))
}
