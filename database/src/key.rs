use std::fmt::{Display, Formatter};

const SEP: u8 = b'/';

/// A db key composed of a bucket prefix, a separator and the serialized key
/// bytes, so that multiple record families can share one column family.
#[derive(Clone)]
pub struct DbKey {
    path: Vec<u8>,
}

impl DbKey {
    pub fn new<TKey: AsRef<[u8]>>(prefix: &[u8], key: TKey) -> Self {
        Self { path: prefix.iter().chain(std::iter::once(&SEP)).chain(key.as_ref().iter()).copied().collect() }
    }
}

impl AsRef<[u8]> for DbKey {
    fn as_ref(&self) -> &[u8] {
        &self.path
    }
}

impl Display for DbKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.path.iter().position(|&b| b == SEP) {
            Some(sep) => {
                f.write_str(&String::from_utf8_lossy(&self.path[..sep]))?;
                f.write_str("/")?;
                self.path[sep + 1..].iter().try_for_each(|b| write!(f, "{:02x}", b))
            }
            None => self.path.iter().try_for_each(|b| write!(f, "{:02x}", b)),
        }
    }
}
