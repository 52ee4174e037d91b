use super::Attribute;
use crate::packet::PacketError;

/// Ordered attribute list of a RADIUS packet
///
/// RADIUS allows a type to repeat (Proxy-State, Class, EAP-Message, ...), so
/// this is a multimap that keeps wire order: [`get`](Self::get) returns the
/// first match, [`get_all`](Self::get_all) every match in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    items: Vec<Attribute>,
}

impl Attributes {
    pub fn new() -> Self {
        Attributes { items: Vec::new() }
    }

    /// Parse a run of TLV records until `data` is exhausted.
    ///
    /// Any bad record fails the whole parse.
    pub fn parse(mut data: &[u8]) -> Result<Self, PacketError> {
        let mut items = Vec::new();

        while !data.is_empty() {
            let attr = Attribute::decode(data)?;
            data = &data[attr.encoded_length()..];
            items.push(attr);
        }

        Ok(Attributes { items })
    }

    /// Append the wire form of every attribute, in order
    pub fn encode_into(&self, buffer: &mut Vec<u8>) -> Result<(), PacketError> {
        for attr in &self.items {
            attr.encode_into(buffer)?;
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let mut buffer = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buffer)?;
        Ok(buffer)
    }

    /// Total encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        self.items.iter().map(Attribute::encoded_length).sum()
    }

    pub fn add(&mut self, attribute: Attribute) {
        self.items.push(attribute);
    }

    /// Replace every attribute of this type with `attribute`.
    ///
    /// The new value takes the position of the first removed one, or is
    /// appended when the type was absent.
    pub fn set(&mut self, attribute: Attribute) {
        let attr_type = attribute.attr_type;
        match self.items.iter().position(|a| a.attr_type == attr_type) {
            Some(first) => {
                self.items[first] = attribute;
                let mut index = 0;
                self.items.retain(|a| {
                    let keep = index <= first || a.attr_type != attr_type;
                    index += 1;
                    keep
                });
            }
            None => self.items.push(attribute),
        }
    }

    /// Remove every attribute of this type, returning how many were removed
    pub fn remove(&mut self, attr_type: u8) -> usize {
        let before = self.items.len();
        self.items.retain(|a| a.attr_type != attr_type);
        before - self.items.len()
    }

    /// First attribute of this type
    pub fn get(&self, attr_type: u8) -> Option<&Attribute> {
        self.items.iter().find(|a| a.attr_type == attr_type)
    }

    /// All attributes of this type, in wire order
    pub fn get_all(&self, attr_type: u8) -> impl Iterator<Item = &Attribute> + '_ {
        self.items.iter().filter(move |a| a.attr_type == attr_type)
    }

    pub fn contains(&self, attr_type: u8) -> bool {
        self.get(attr_type).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl From<Vec<Attribute>> for Attributes {
    fn from(items: Vec<Attribute>) -> Self {
        Attributes { items }
    }
}

impl FromIterator<Attribute> for Attributes {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        Attributes {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl IntoIterator for Attributes {
    type Item = Attribute;
    type IntoIter = std::vec::IntoIter<Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
