//! Little-endian write cursor over a payload buffer.

pub struct BytesMut<'a> {
    data: &'a mut [u8],
    len: usize,
}

impl<'a> BytesMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data, len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.len
    }

    #[inline]
    fn check_remaining(&self, count: usize) {
        assert!(
            self.remaining() >= count,
            "write buffer overflow: remaining {} bytes, tried to add {count} bytes",
            self.remaining(),
        );
    }

    #[inline]
    pub fn put_slice(&mut self, src: &[u8]) {
        self.check_remaining(src.len());

        self.data[self.len..self.len + src.len()].copy_from_slice(src);
        self.len += src.len();
    }

    #[inline]
    pub fn put_u8(&mut self, val: u8) {
        self.check_remaining(1);

        self.data[self.len] = val;
        self.len += 1;
    }

    #[inline]
    pub fn put_i8(&mut self, val: i8) {
        self.put_u8(val as u8);
    }

    #[inline]
    pub fn put_u16_le(&mut self, val: u16) {
        self.put_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn put_i16_le(&mut self, val: i16) {
        self.put_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn put_u32_le(&mut self, val: u32) {
        self.put_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn put_i32_le(&mut self, val: i32) {
        self.put_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn put_u64_le(&mut self, val: u64) {
        self.put_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn put_i64_le(&mut self, val: i64) {
        self.put_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn put_f32_le(&mut self, val: f32) {
        self.put_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn put_f64_le(&mut self, val: f64) {
        self.put_slice(&val.to_le_bytes());
    }
}
