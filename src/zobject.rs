//! Object tree and property tables
//!
//! Objects are never materialised: every accessor computes an offset into
//! the object table in story memory. Records are 9 bytes with 8-bit links in
//! v1-3 and 14 bytes with 16-bit links in v4+.

use crate::error::VmError;
use crate::game::Game;
use bitvec::prelude::*;
use log::{debug, warn};

/// Parent/sibling/child link slots in an object record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Parent,
    Sibling,
    Child,
}

/// Decoded property entry header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyEntry {
    pub number: u16,
    pub len: u16,
    /// Address of the property data
    pub data: u32,
}

impl Game {
    fn small_objects(&self) -> bool {
        self.header.version <= 3
    }

    fn attribute_bytes(&self) -> u32 {
        if self.small_objects() {
            4
        } else {
            6
        }
    }

    /// Address of an object's record
    pub fn object_addr(&self, obj: u16) -> Result<u32, VmError> {
        if obj == 0 || (self.small_objects() && obj > 255) {
            return Err(VmError::InvalidObject { object: obj, pc: 0 });
        }
        let defaults = self.header.property_defaults_count() as u32 * 2;
        let size = if self.small_objects() { 9 } else { 14 };
        let addr = self.header.object_table_addr as u32 + defaults + (obj as u32 - 1) * size;
        // the whole record must lie inside the story
        if (addr + size) as usize > self.memory.len() {
            return Err(VmError::InvalidObject { object: obj, pc: 0 });
        }
        Ok(addr)
    }

    fn link_addr(&self, obj: u16, link: Link) -> Result<u32, VmError> {
        let base = self.object_addr(obj)? + self.attribute_bytes();
        let slot = match link {
            Link::Parent => 0,
            Link::Sibling => 1,
            Link::Child => 2,
        };
        Ok(if self.small_objects() {
            base + slot
        } else {
            base + 2 * slot
        })
    }

    /// Read a tree link; object 0 has no links
    pub fn object_link(&self, obj: u16, link: Link) -> Result<u16, VmError> {
        if obj == 0 {
            warn!("Reading {:?} of object 0", link);
            return Ok(0);
        }
        let addr = self.link_addr(obj, link)?;
        Ok(if self.small_objects() {
            self.read_byte(addr) as u16
        } else {
            self.read_word(addr)
        })
    }

    fn set_object_link(&mut self, obj: u16, link: Link, value: u16) -> Result<(), VmError> {
        let addr = self.link_addr(obj, link)?;
        if self.small_objects() {
            self.write_byte(addr, value as u8)
        } else {
            self.write_word(addr, value)
        }
    }

    fn attribute_range(&self, obj: u16, attr: u16) -> Result<std::ops::Range<usize>, VmError> {
        if attr as u32 >= self.attribute_bytes() * 8 {
            return Err(VmError::InvalidObject { object: obj, pc: 0 });
        }
        let start = self.object_addr(obj)? as usize;
        Ok(start..start + self.attribute_bytes() as usize)
    }

    pub fn test_attribute(&self, obj: u16, attr: u16) -> Result<bool, VmError> {
        if obj == 0 {
            warn!("Testing attribute {} of object 0", attr);
            return Ok(false);
        }
        let range = self.attribute_range(obj, attr)?;
        let bits = self.memory[range].view_bits::<Msb0>();
        Ok(bits[attr as usize])
    }

    pub fn set_attribute(&mut self, obj: u16, attr: u16, value: bool) -> Result<(), VmError> {
        if obj == 0 {
            warn!("Changing attribute {} of object 0", attr);
            return Ok(());
        }
        let range = self.attribute_range(obj, attr)?;
        if range.end > self.dynamic_size() {
            return Err(VmError::Memory(format!(
                "Attributes of object {} lie outside dynamic memory",
                obj
            )));
        }
        self.memory[range]
            .view_bits_mut::<Msb0>()
            .set(attr as usize, value);
        Ok(())
    }

    /// Address of an object's property table (its short name header)
    pub fn property_table_addr(&self, obj: u16) -> Result<u32, VmError> {
        let offset = if self.small_objects() { 7 } else { 12 };
        Ok(self.read_word(self.object_addr(obj)? + offset) as u32)
    }

    /// Address of the encoded short name of an object
    pub fn object_name_addr(&self, obj: u16) -> Result<u32, VmError> {
        Ok(self.property_table_addr(obj)? + 1)
    }

    /// Decode the property entry whose size byte is at `addr`; `None` at the
    /// terminating zero byte
    pub fn property_entry(&self, addr: u32) -> Option<PropertyEntry> {
        let size_byte = self.read_byte(addr);
        if size_byte == 0 {
            return None;
        }
        if self.small_objects() {
            return Some(PropertyEntry {
                number: (size_byte & 0x1f) as u16,
                len: (size_byte >> 5) as u16 + 1,
                data: addr + 1,
            });
        }
        let number = (size_byte & 0x3f) as u16;
        if size_byte & 0x80 != 0 {
            let len = (self.read_byte(addr + 1) & 0x3f) as u16;
            Some(PropertyEntry {
                number,
                len: if len == 0 { 64 } else { len },
                data: addr + 2,
            })
        } else {
            Some(PropertyEntry {
                number,
                len: if size_byte & 0x40 != 0 { 2 } else { 1 },
                data: addr + 1,
            })
        }
    }

    fn first_property(&self, obj: u16) -> Result<u32, VmError> {
        let table = self.property_table_addr(obj)?;
        let name_words = self.read_byte(table) as u32;
        Ok(table + 1 + 2 * name_words)
    }

    /// Find a property entry on an object
    pub fn find_property(&self, obj: u16, prop: u16) -> Result<Option<PropertyEntry>, VmError> {
        let mut addr = self.first_property(obj)?;
        while let Some(entry) = self.property_entry(addr) {
            if entry.number == prop {
                return Ok(Some(entry));
            }
            // Properties are stored in descending order
            if entry.number < prop {
                break;
            }
            addr = entry.data + entry.len as u32;
        }
        Ok(None)
    }

    /// Value of a property, falling back to the defaults table
    pub fn property_value(&self, obj: u16, prop: u16) -> Result<u16, VmError> {
        if obj == 0 {
            warn!("get_prop on object 0");
            return Ok(0);
        }
        match self.find_property(obj, prop)? {
            Some(entry) if entry.len == 1 => Ok(self.read_byte(entry.data) as u16),
            Some(entry) => {
                if entry.len > 2 {
                    warn!(
                        "get_prop {} on object {} has length {}, reading first word",
                        prop, obj, entry.len
                    );
                }
                Ok(self.read_word(entry.data))
            }
            None => {
                if prop == 0 || prop as usize > self.header.property_defaults_count() {
                    return Err(VmError::InvalidProperty {
                        object: obj,
                        property: prop,
                        pc: 0,
                    });
                }
                Ok(self.read_word(self.header.object_table_addr as u32 + 2 * (prop as u32 - 1)))
            }
        }
    }

    /// Data address of a property, or 0 when the object lacks it
    pub fn property_addr(&self, obj: u16, prop: u16) -> Result<u16, VmError> {
        if obj == 0 {
            return Ok(0);
        }
        Ok(self
            .find_property(obj, prop)?
            .map(|e| e.data as u16)
            .unwrap_or(0))
    }

    /// Length of the property whose data starts at `data`
    pub fn property_len(&self, data: u16) -> u16 {
        if data == 0 {
            return 0;
        }
        let b = self.read_byte(data as u32 - 1);
        if self.small_objects() {
            (b >> 5) as u16 + 1
        } else if b & 0x80 != 0 {
            match b & 0x3f {
                0 => 64,
                n => n as u16,
            }
        } else if b & 0x40 != 0 {
            2
        } else {
            1
        }
    }

    /// Number of the property after `prop`; 0 starts the walk and 0 ends it
    pub fn next_property(&self, obj: u16, prop: u16) -> Result<u16, VmError> {
        if obj == 0 {
            return Ok(0);
        }
        let next_addr = if prop == 0 {
            self.first_property(obj)?
        } else {
            let entry = self
                .find_property(obj, prop)?
                .ok_or(VmError::InvalidProperty {
                    object: obj,
                    property: prop,
                    pc: 0,
                })?;
            entry.data + entry.len as u32
        };
        Ok(self.property_entry(next_addr).map(|e| e.number).unwrap_or(0))
    }

    /// Overwrite a 1- or 2-byte property
    pub fn put_property(&mut self, obj: u16, prop: u16, value: u16) -> Result<(), VmError> {
        let missing = VmError::InvalidProperty {
            object: obj,
            property: prop,
            pc: 0,
        };
        if obj == 0 {
            return Err(missing);
        }
        let entry = self.find_property(obj, prop)?.ok_or(missing.clone())?;
        match entry.len {
            1 => self.write_byte(entry.data, (value & 0xff) as u8),
            2 => self.write_word(entry.data, value),
            _ => Err(missing),
        }
    }

    /// Detach an object from its parent
    pub fn remove_object(&mut self, obj: u16) -> Result<(), VmError> {
        if obj == 0 {
            warn!("remove_obj on object 0");
            return Ok(());
        }
        let parent = self.object_link(obj, Link::Parent)?;
        if parent != 0 {
            let sibling = self.object_link(obj, Link::Sibling)?;
            let first = self.object_link(parent, Link::Child)?;
            if first == obj {
                self.set_object_link(parent, Link::Child, sibling)?;
            } else {
                let mut cursor = first;
                while cursor != 0 {
                    let next = self.object_link(cursor, Link::Sibling)?;
                    if next == obj {
                        self.set_object_link(cursor, Link::Sibling, sibling)?;
                        break;
                    }
                    cursor = next;
                }
            }
        }
        self.set_object_link(obj, Link::Parent, 0)?;
        self.set_object_link(obj, Link::Sibling, 0)
    }

    /// Make `obj` the first child of `dest`
    pub fn insert_object(&mut self, obj: u16, dest: u16) -> Result<(), VmError> {
        if obj == 0 {
            warn!("insert_obj with object 0");
            return Ok(());
        }
        self.remove_object(obj)?;
        if dest == 0 {
            return Ok(());
        }
        let first = self.object_link(dest, Link::Child)?;
        self.set_object_link(obj, Link::Parent, dest)?;
        self.set_object_link(obj, Link::Sibling, first)?;
        self.set_object_link(dest, Link::Child, obj)?;
        debug!("Object {} moved into {}", obj, dest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StoryBuilder;
    use test_log::test;

    fn game(version: u8) -> Game {
        let mut story = StoryBuilder::new(version);
        // room 1 contains 2 and 3 (3 first)
        story.object(1, 0, 0, 3);
        story.object(2, 1, 0, 0);
        story.object(3, 1, 2, 0);
        story.properties(1, &[(18, &[0x12, 0x34]), (5, &[7])]);
        story.properties(2, &[(3, &[1, 2, 3, 4])]);
        story.properties(3, &[]);
        story.property_default(7, 0x2222);
        Game::from_memory(story.build()).unwrap()
    }

    #[test]
    fn test_tree_links() {
        let g = game(3);
        assert_eq!(g.object_link(3, Link::Parent).unwrap(), 1);
        assert_eq!(g.object_link(3, Link::Sibling).unwrap(), 2);
        assert_eq!(g.object_link(1, Link::Child).unwrap(), 3);
        assert_eq!(g.object_link(0, Link::Child).unwrap(), 0);
    }

    #[test]
    fn test_remove_middle_and_first_child() {
        for version in [3, 5] {
            let mut g = game(version);
            g.remove_object(2).unwrap();
            assert_eq!(g.object_link(3, Link::Sibling).unwrap(), 0);
            assert_eq!(g.object_link(2, Link::Parent).unwrap(), 0);

            g.remove_object(3).unwrap();
            assert_eq!(g.object_link(1, Link::Child).unwrap(), 0);
        }
    }

    #[test]
    fn test_insert_becomes_first_child() {
        let mut g = game(3);
        g.insert_object(2, 3).unwrap();
        assert_eq!(g.object_link(3, Link::Child).unwrap(), 2);
        assert_eq!(g.object_link(2, Link::Parent).unwrap(), 3);
        assert_eq!(g.object_link(1, Link::Child).unwrap(), 3);
        assert_eq!(g.object_link(3, Link::Sibling).unwrap(), 0);
    }

    #[test]
    fn test_attributes() {
        for version in [3, 5] {
            let mut g = game(version);
            assert!(!g.test_attribute(2, 0).unwrap());
            g.set_attribute(2, 0, true).unwrap();
            g.set_attribute(2, 31, true).unwrap();
            assert!(g.test_attribute(2, 0).unwrap());
            assert!(g.test_attribute(2, 31).unwrap());
            assert!(!g.test_attribute(3, 0).unwrap());
            g.set_attribute(2, 0, false).unwrap();
            assert!(!g.test_attribute(2, 0).unwrap());
        }
        let g = game(3);
        assert!(g.test_attribute(2, 32).is_err());
    }

    #[test]
    fn test_property_values_and_defaults() {
        for version in [3, 5] {
            let g = game(version);
            assert_eq!(g.property_value(1, 18).unwrap(), 0x1234);
            assert_eq!(g.property_value(1, 5).unwrap(), 7);
            assert_eq!(g.property_value(1, 7).unwrap(), 0x2222);
            let addr = g.property_addr(2, 3).unwrap();
            assert_ne!(addr, 0);
            assert_eq!(g.property_len(addr), 4);
            assert_eq!(g.property_addr(3, 3).unwrap(), 0);
            assert_eq!(g.property_len(0), 0);
        }
    }

    #[test]
    fn test_next_property_walk() {
        let g = game(5);
        assert_eq!(g.next_property(1, 0).unwrap(), 18);
        assert_eq!(g.next_property(1, 18).unwrap(), 5);
        assert_eq!(g.next_property(1, 5).unwrap(), 0);
        assert!(g.next_property(1, 9).is_err());
    }

    #[test]
    fn test_put_property() {
        let mut g = game(3);
        g.put_property(1, 18, 0xabcd).unwrap();
        assert_eq!(g.property_value(1, 18).unwrap(), 0xabcd);
        g.put_property(1, 5, 0x1ff).unwrap();
        assert_eq!(g.property_value(1, 5).unwrap(), 0xff);
        assert!(g.put_property(2, 3, 1).is_err());
        assert!(g.put_property(3, 3, 1).is_err());
    }
}
