//! In-memory block buffer.
//!
//! A `Block` accumulates framed messages until it is uploaded as one immutable
//! remote block. Once uploaded it accepts no more data and its buffer is freed.

use blobwriter_core::BlockId;
use bytes::BytesMut;

use crate::backend::BlockBackend;
use crate::error::Result;

#[derive(Debug)]
pub struct Block {
    id: BlockId,
    blob: String,
    capacity: usize,
    data: BytesMut,
    uploaded: bool,
    uploaded_len: usize,
}

impl Block {
    pub fn new(id: BlockId, blob: impl Into<String>, capacity: usize) -> Self {
        Self {
            id,
            blob: blob.into(),
            capacity,
            data: BytesMut::new(),
            uploaded: false,
            uploaded_len: 0,
        }
    }

    pub fn id(&self) -> &BlockId {
        &self.id
    }

    pub fn blob(&self) -> &str {
        &self.blob
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently buffered (zero after upload).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_uploaded(&self) -> bool {
        self.uploaded
    }

    /// Bytes that were sent by the successful upload.
    pub fn uploaded_len(&self) -> usize {
        self.uploaded_len
    }

    /// Whether `len` more bytes fit without exceeding capacity.
    pub fn fits(&self, len: usize) -> bool {
        self.data.len() + len <= self.capacity
    }

    /// Append bytes to the buffer.
    ///
    /// # Panics
    ///
    /// If the block was already uploaded or the bytes do not fit. Both are
    /// caller bugs; `BlockState` checks `fits` before every append.
    pub fn append(&mut self, bytes: &[u8]) {
        assert!(!self.uploaded, "append to uploaded block {}", self.id);
        assert!(
            self.fits(bytes.len()),
            "append of {} bytes overflows block {} ({}/{})",
            bytes.len(),
            self.id,
            self.data.len(),
            self.capacity
        );
        self.data.extend_from_slice(bytes);
    }

    /// Upload the buffer under this block's id and release it.
    ///
    /// On failure the buffer is kept and the block stays not-uploaded; the
    /// error is returned as-is, without retrying.
    ///
    /// # Panics
    ///
    /// If the block was already uploaded or is empty.
    pub async fn upload(&mut self, backend: &dyn BlockBackend) -> Result<usize> {
        assert!(!self.uploaded, "block {} uploaded twice", self.id);
        assert!(!self.data.is_empty(), "empty block {} uploaded", self.id);

        let data = self.data.split().freeze();
        let len = data.len();

        if let Err(e) = backend.put_block(&self.blob, &self.id, data.clone()).await {
            self.data.extend_from_slice(&data);
            return Err(e);
        }

        self.uploaded = true;
        self.uploaded_len = len;
        self.data = BytesMut::new();
        Ok(len)
    }
}
