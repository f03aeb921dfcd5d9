use zeroize::Zeroize;

/// RC4 stream cipher (KSA + PRGA). The state is wiped on drop.
pub(crate) struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    /// `key` must be non-empty; callers always pass a derived block key.
    pub(crate) fn new(key: &[u8]) -> Self {
        debug_assert!(!key.is_empty(), "RC4 key must be non-empty");

        let mut s = [0u8; 256];
        for (i, v) in s.iter_mut().enumerate() {
            *v = i as u8;
        }

        let mut j: u8 = 0;
        if !key.is_empty() {
            for idx in 0..256usize {
                j = j.wrapping_add(s[idx]).wrapping_add(key[idx % key.len()]);
                s.swap(idx, j as usize);
            }
        }

        Self { s, i: 0, j: 0 }
    }

    pub(crate) fn apply_keystream(&mut self, data: &mut [u8]) {
        for b in data {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[self.i as usize]);
            self.s.swap(self.i as usize, self.j as usize);
            let idx = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
            *b ^= self.s[idx as usize];
        }
    }

    /// Advance the keystream by `n` bytes.
    pub(crate) fn discard(&mut self, mut n: usize) {
        let mut scratch = [0u8; 64];
        while n > 0 {
            let take = n.min(scratch.len());
            self.apply_keystream(&mut scratch[..take]);
            n -= take;
        }
        scratch.zeroize();
    }
}

impl Drop for Rc4 {
    fn drop(&mut self) {
        self.s.zeroize();
        self.i.zeroize();
        self.j.zeroize();
    }
}
