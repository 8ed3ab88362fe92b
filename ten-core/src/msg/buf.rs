use crate::error::TenError;
use std::ops::{Deref, DerefMut};

/// The binary payload of a [`Data`](super::Data), [`AudioFrame`](super::AudioFrame)
/// or [`VideoFrame`](super::VideoFrame).
///
/// Locking moves the bytes out into a [`BufLock`]; the envelope cannot
/// be read, replaced or sent until the lock is handed back.
#[derive(Debug, Clone, Default)]
pub struct Buf {
    bytes: Vec<u8>,
    locked: bool,
}

impl Buf {
    pub(crate) fn is_locked(&self) -> bool {
        self.locked
    }

    pub(crate) fn bytes(&self) -> Result<&[u8], TenError> {
        self.check_unlocked()?;
        Ok(&self.bytes)
    }

    pub(crate) fn replace(&mut self, bytes: Vec<u8>) -> Result<(), TenError> {
        self.check_unlocked()?;
        self.bytes = bytes;
        Ok(())
    }

    pub(crate) fn lock(&mut self) -> Result<BufLock, TenError> {
        self.check_unlocked()?;
        self.locked = true;
        Ok(BufLock {
            bytes: std::mem::take(&mut self.bytes),
        })
    }

    pub(crate) fn unlock(&mut self, lock: BufLock) -> Result<(), TenError> {
        if !self.locked {
            return Err(TenError::InvalidArgument(
                "unlock_buf on a buffer that is not locked".into(),
            ));
        }
        self.bytes = lock.bytes;
        self.locked = false;
        Ok(())
    }

    fn check_unlocked(&self) -> Result<(), TenError> {
        if self.locked {
            Err(TenError::InvalidArgument("the buffer is locked".into()))
        } else {
            Ok(())
        }
    }
}

/// Exclusive write access to an envelope's buffer.
///
/// Dereferences to the bytes. Give it back with `unlock_buf`; dropping
/// it instead leaves the envelope locked (and unsendable).
#[derive(Debug)]
pub struct BufLock {
    bytes: Vec<u8>,
}

impl Deref for BufLock {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for BufLock {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_moves_bytes_out_and_back() {
        let mut buf = Buf::default();
        buf.replace(vec![1, 2, 3]).unwrap();

        let mut lock = buf.lock().unwrap();
        assert!(buf.is_locked());
        assert!(buf.bytes().is_err());
        assert!(buf.lock().is_err());
        lock[0] = 9;

        buf.unlock(lock).unwrap();
        assert_eq!(buf.bytes().unwrap(), &[9, 2, 3]);
    }

    #[test]
    fn unlock_without_lock_fails() {
        let mut a = Buf::default();
        let mut b = Buf::default();
        let lock = a.lock().unwrap();
        assert!(b.unlock(lock).is_err());
    }
}
