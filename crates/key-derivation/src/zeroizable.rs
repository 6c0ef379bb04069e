use std::{fmt, ops::Deref};

use bitcoin::bip32::{ChainCode, Xpriv};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// [`Xpriv`] wrapper that erases its secret material on drop.
#[derive(Clone)]
pub struct ZeroizableXpriv(Xpriv);

impl ZeroizableXpriv {
    pub fn new(xpriv: Xpriv) -> Self {
        Self(xpriv)
    }
}

impl From<Xpriv> for ZeroizableXpriv {
    fn from(value: Xpriv) -> Self {
        Self(value)
    }
}

impl Deref for ZeroizableXpriv {
    type Target = Xpriv;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Zeroize for ZeroizableXpriv {
    fn zeroize(&mut self) {
        self.0.private_key.non_secure_erase();
        self.0.chain_code = ChainCode::from([0u8; 32]);
    }
}

impl Drop for ZeroizableXpriv {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for ZeroizableXpriv {}

// Never print key material.
impl fmt::Debug for ZeroizableXpriv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ZeroizableXpriv(..)")
    }
}
