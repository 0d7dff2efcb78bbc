use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::objects::Checksum;

/// One interned metadata triple: category and key index into the string
/// table, value into the checksum table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub category: u32,
    pub key: u32,
    pub value: u32,
}

/// Auxiliary snapshot metadata: (category, key) -> checksum associations,
/// e.g. content types to object checksums. Interned like the snapshot
/// index; lookup maps are rebuilt after deserialization.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Metadata {
    checksums_list: Vec<Checksum>,
    strings_list: Vec<String>,
    items_list: Vec<Item>,

    #[serde(skip)]
    checksums_map: HashMap<Checksum, u32>,
    #[serde(skip)]
    strings_map: HashMap<String, u32>,
    #[serde(skip)]
    items_map: HashMap<Item, u32>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern_checksum(&mut self, checksum: Checksum) -> u32 {
        if let Some(id) = self.checksums_map.get(&checksum) {
            return *id;
        }
        let id = self.checksums_list.len() as u32;
        self.checksums_map.insert(checksum, id);
        self.checksums_list.push(checksum);
        id
    }

    fn intern_string(&mut self, value: &str) -> u32 {
        if let Some(id) = self.strings_map.get(value) {
            return *id;
        }
        let id = self.strings_list.len() as u32;
        self.strings_map.insert(value.to_string(), id);
        self.strings_list.push(value.to_string());
        id
    }

    /// Record a (category, key) -> checksum association. Duplicates collapse.
    pub fn add(&mut self, category: &str, key: &str, value: Checksum) {
        let item = Item {
            category: self.intern_string(category),
            key: self.intern_string(key),
            value: self.intern_checksum(value),
        };
        if !self.items_map.contains_key(&item) {
            let id = self.items_list.len() as u32;
            self.items_list.push(item);
            self.items_map.insert(item, id);
        }
    }

    /// All keys recorded under a category.
    pub fn list_keys(&self, category: &str) -> Vec<&str> {
        let Some(category_id) = self.strings_map.get(category) else {
            return Vec::new();
        };
        self.items_list
            .iter()
            .filter(|item| item.category == *category_id)
            .map(|item| self.strings_list[item.key as usize].as_str())
            .collect()
    }

    /// All checksums recorded under (category, key).
    pub fn list_values(&self, category: &str, key: &str) -> Vec<Checksum> {
        let (Some(category_id), Some(key_id)) =
            (self.strings_map.get(category), self.strings_map.get(key))
        else {
            return Vec::new();
        };
        self.items_list
            .iter()
            .filter(|item| item.category == *category_id && item.key == *key_id)
            .map(|item| self.checksums_list[item.value as usize])
            .collect()
    }

    /// Reverse lookup: the key a checksum was recorded under, per category.
    pub fn lookup_key_for_value(&self, category: &str, value: &Checksum) -> Option<&str> {
        let category_id = self.strings_map.get(category)?;
        let value_id = self.checksums_map.get(value)?;
        self.items_list
            .iter()
            .find(|item| item.category == *category_id && item.value == *value_id)
            .map(|item| self.strings_list[item.key as usize].as_str())
    }

    pub fn len(&self) -> usize {
        self.items_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items_list.is_empty()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut md: Metadata = rmp_serde::from_slice(data)?;
        md.checksums_map = md
            .checksums_list
            .iter()
            .enumerate()
            .map(|(i, c)| (*c, i as u32))
            .collect();
        md.strings_map = md
            .strings_list
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i as u32))
            .collect();
        md.items_map = md
            .items_list
            .iter()
            .enumerate()
            .map(|(i, item)| (*item, i as u32))
            .collect();
        Ok(md)
    }
}
