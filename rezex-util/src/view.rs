//  Copyright 2025 rezex authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

use bytes::Bytes;

/// The three input shapes the Dispatch Layer routes (spec.md §4.6):
///
/// - `Owned`: bytes the caller transferred to us. Cheaply cloneable
///   (`Bytes` is refcounted), so holding one past the call is free.
/// - `Borrowed`: a pointer+length into memory the caller only
///   guarantees is valid for the duration of the call. Never copied,
///   never stored past the call that received it.
/// - `Text`: caller-owned Unicode string data, addressed through its
///   UTF-8 bytes with no copy. Latin1-encoded patterns still address
///   these bytes directly; re-encoding is the engine's concern, not the
///   view's.
///
/// `ByteView` itself never owns a copy it didn't already own going in -
/// it only ever borrows or wraps a refcounted `Bytes`.
#[derive(Debug, Clone)]
pub enum ByteView<'a> {
    Owned(Bytes),
    Borrowed(&'a [u8]),
    Text(&'a str),
}

impl<'a> ByteView<'a> {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ByteView::Owned(bytes) => bytes.as_ref(),
            ByteView::Borrowed(slice) => slice,
            ByteView::Text(s) => s.as_bytes(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl<'a> From<&'a [u8]> for ByteView<'a> {
    fn from(slice: &'a [u8]) -> Self {
        ByteView::Borrowed(slice)
    }
}

impl<'a> From<&'a str> for ByteView<'a> {
    fn from(s: &'a str) -> Self {
        ByteView::Text(s)
    }
}

impl From<Vec<u8>> for ByteView<'static> {
    fn from(v: Vec<u8>) -> Self {
        ByteView::Owned(Bytes::from(v))
    }
}

impl From<Bytes> for ByteView<'static> {
    fn from(b: Bytes) -> Self {
        ByteView::Owned(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_borrowed_and_text_all_address_the_same_bytes() {
        let owned: ByteView = Bytes::from_static(b"hello").into();
        let borrowed: ByteView = b"hello"[..].into();
        let text: ByteView = "hello".into();
        assert_eq!(owned.as_bytes(), b"hello");
        assert_eq!(borrowed.as_bytes(), b"hello");
        assert_eq!(text.as_bytes(), b"hello");
    }

    #[test]
    fn empty_view_reports_empty() {
        let v: ByteView = b""[..].into();
        assert!(v.is_empty());
        assert_eq!(v.len(), 0);
    }
}
