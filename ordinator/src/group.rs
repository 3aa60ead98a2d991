//! Matching a needle byte against a group of big core control bytes at once.
use std::num::NonZeroU16;

/// Number of control bytes compared at once, also the length of the mirrored control tail.
pub const GROUP_WIDTH: usize = 16;

/// Control byte of an empty slot. Occupied slots store a 7-bit hash fragment.
pub const EMPTY: u8 = 0xff;

/// A group of [`GROUP_WIDTH`] consecutive control bytes.
#[derive(Clone, Copy)]
pub struct Group<'a>(&'a [u8; GROUP_WIDTH]);

impl<'a> Group<'a> {
    /// Loads the group starting at `pos`.
    ///
    /// The control array carries a mirrored tail of `GROUP_WIDTH` bytes, so this is in bounds for
    /// every slot index.
    #[inline(always)]
    pub fn load(control: &'a [u8], pos: usize) -> Self {
        Self(control[pos..pos + GROUP_WIDTH].try_into().unwrap())
    }

    /// Positions within the group holding `needle`.
    #[inline(always)]
    pub fn match_byte(self, needle: u8) -> BitMask {
        BitMask(find_byte_among_16(needle, self.0))
    }

    /// Positions within the group holding [`EMPTY`].
    #[inline(always)]
    pub fn match_empty(self) -> BitMask {
        self.match_byte(EMPTY)
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn find_byte_among_16(needle: u8, haystack: &[u8; 16]) -> u16 {
    #[cfg(target_arch = "x86")]
    use core::arch::x86;
    #[cfg(target_arch = "x86_64")]
    use core::arch::x86_64 as x86;

    // SAFETY: SSE2 is part of the baseline for the targets this is compiled for, the pointer to
    // haystack is valid and loadu_si128 has no alignment requirement
    unsafe {
        let bytes = x86::_mm_loadu_si128((haystack as *const [u8; 16]).cast::<x86::__m128i>());

        let needle = x86::_mm_set1_epi8(needle as i8);

        x86::_mm_movemask_epi8(x86::_mm_cmpeq_epi8(bytes, needle)) as u16
    }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn find_byte_among_16(needle: u8, haystack: &[u8; 16]) -> u16 {
    let mut found = 0;
    for (i, &candidate) in haystack.iter().enumerate() {
        found |= ((candidate == needle) as u16) << i;
    }
    found
}

/// Set of positions within a group, iterated in ascending order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BitMask(u16);

impl BitMask {
    /// Whether any position is set.
    #[inline(always)]
    pub fn any(self) -> bool {
        self.0 != 0
    }

    /// The lowest set position.
    #[inline(always)]
    pub fn lowest(self) -> Option<usize> {
        NonZeroU16::new(self.0).map(|bits| bits.trailing_zeros() as usize)
    }
}

impl Iterator for BitMask {
    type Item = usize;

    #[inline(always)]
    fn next(&mut self) -> Option<usize> {
        let lowest = self.lowest()?;
        self.0 &= self.0 - 1;
        Some(lowest)
    }
}
