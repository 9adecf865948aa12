use braid_hashes::HasherBase;
use num_bigint::BigUint;

/// Field-order writing extensions shared by header and transaction hashing.
pub trait HasherExtensions {
    /// Writes the len as u64 little endian bytes
    fn write_len(&mut self, len: usize) -> &mut Self;

    /// Writes the boolean as a u8
    fn write_bool(&mut self, element: bool) -> &mut Self;

    /// Writes a single u8
    fn write_u8(&mut self, element: u8) -> &mut Self;

    /// Writes the u16 as a little endian u8 array
    fn write_u16(&mut self, element: u16) -> &mut Self;

    /// Writes the u64 as a little endian u8 array
    fn write_u64(&mut self, element: u64) -> &mut Self;

    /// Writes the u128 as a little endian u8 array
    fn write_u128(&mut self, element: u128) -> &mut Self;

    /// Writes a big uint as its minimal big endian byte representation,
    /// length prefixed
    fn write_biguint(&mut self, element: &BigUint) -> &mut Self;

    /// Writes the number of bytes followed by the bytes themselves
    fn write_var_bytes(&mut self, bytes: &[u8]) -> &mut Self;

    /// Writes the array len followed by each element as [[u8]]
    fn write_var_array<D: AsRef<[u8]>>(&mut self, arr: &[D]) -> &mut Self;
}

impl<T: HasherBase> HasherExtensions for T {
    #[inline(always)]
    fn write_len(&mut self, len: usize) -> &mut Self {
        self.update((len as u64).to_le_bytes())
    }

    #[inline(always)]
    fn write_bool(&mut self, element: bool) -> &mut Self {
        self.update(if element { [1u8] } else { [0u8] })
    }

    #[inline(always)]
    fn write_u8(&mut self, element: u8) -> &mut Self {
        self.update(element.to_le_bytes())
    }

    #[inline(always)]
    fn write_u16(&mut self, element: u16) -> &mut Self {
        self.update(element.to_le_bytes())
    }

    #[inline(always)]
    fn write_u64(&mut self, element: u64) -> &mut Self {
        self.update(element.to_le_bytes())
    }

    #[inline(always)]
    fn write_u128(&mut self, element: u128) -> &mut Self {
        self.update(element.to_le_bytes())
    }

    #[inline(always)]
    fn write_biguint(&mut self, element: &BigUint) -> &mut Self {
        self.write_var_bytes(&element.to_bytes_be())
    }

    #[inline(always)]
    fn write_var_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.write_len(bytes.len()).update(bytes)
    }

    #[inline(always)]
    fn write_var_array<D: AsRef<[u8]>>(&mut self, arr: &[D]) -> &mut Self {
        self.write_len(arr.len());
        for element in arr {
            self.update(element);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_hashes::{Hasher, TransactionHash};

    #[test]
    fn var_bytes_are_length_prefixed() {
        let mut a = TransactionHash::new();
        a.write_var_bytes(b"ab").write_var_bytes(b"c");
        let mut b = TransactionHash::new();
        b.write_var_bytes(b"a").write_var_bytes(b"bc");
        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn biguint_minimal_encoding() {
        let mut a = TransactionHash::new();
        a.write_biguint(&BigUint::from(0x0102u32));
        let mut b = TransactionHash::new();
        b.write_var_bytes(&[1, 2]);
        assert_eq!(a.finalize(), b.finalize());
    }
}
