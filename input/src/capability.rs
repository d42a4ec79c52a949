use crate::event::{ABS_MAX, EV_ABS, EV_KEY, EV_MAX, EV_MSC, EV_REL, EV_SYN, KEY_MAX, MSC_MAX, REL_MAX};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Error;
use std::iter::FromIterator;
use thiserror::Error;

/// Event types carried over from a source device. Anything else the source reports (LEDs,
/// autorepeat, switches, force feedback) is left off the virtual device.
pub const MIRRORED_TYPES: [u16; 5] = [EV_SYN, EV_KEY, EV_REL, EV_ABS, EV_MSC];

const WORD_BITS: usize = u64::BITS as usize;

/// Fixed-size set of event codes in `0..=max`.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    max: u16,
    words: Box<[u64]>,
}

impl Bitmap {
    pub fn new(max: u16) -> Self {
        let len = (max as usize + WORD_BITS) / WORD_BITS;
        Bitmap {
            max,
            words: vec![0; len].into_boxed_slice(),
        }
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    pub fn contains(&self, code: u16) -> bool {
        if code > self.max {
            return false;
        }

        let code = code as usize;
        self.words[code / WORD_BITS] & (1 << (code % WORD_BITS)) != 0
    }

    /// Returns `false` if `code` does not fit.
    pub fn insert(&mut self, code: u16) -> bool {
        if code > self.max {
            return false;
        }

        let code = code as usize;
        self.words[code / WORD_BITS] |= 1 << (code % WORD_BITS);
        true
    }

    pub fn remove(&mut self, code: u16) {
        if code <= self.max {
            let code = code as usize;
            self.words[code / WORD_BITS] &= !(1 << (code % WORD_BITS));
        }
    }

    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|word| *word = 0);
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        (0..=self.max).filter(move |code| self.contains(*code))
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsInfo {
    pub value: i32,
    pub minimum: i32,
    pub maximum: i32,
    pub fuzz: i32,
    pub flat: i32,
    pub resolution: i32,
}

/// A single capability declaration made on a virtual device before it is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Declaration {
    EventType(u16),
    Key(u16),
    Rel(u16),
    /// The axis setup is issued before the axis bit.
    Abs { code: u16, info: AbsInfo },
    Misc(u16),
}

/// Largest code of an event category, if it is one that gets mirrored.
pub fn max_code(type_: u16) -> Option<u16> {
    match type_ {
        EV_KEY => Some(KEY_MAX),
        EV_REL => Some(REL_MAX),
        EV_ABS => Some(ABS_MAX),
        EV_MSC => Some(MSC_MAX),
        _ => None,
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    types: Bitmap,
    keys: Bitmap,
    relative: Bitmap,
    absolute: Bitmap,
    misc: Bitmap,
    abs_info: BTreeMap<u16, AbsInfo>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        CapabilitySet {
            types: Bitmap::new(EV_MAX),
            keys: Bitmap::new(KEY_MAX),
            relative: Bitmap::new(REL_MAX),
            absolute: Bitmap::new(ABS_MAX),
            misc: Bitmap::new(MSC_MAX),
            abs_info: BTreeMap::new(),
        }
    }

    pub fn types(&self) -> &Bitmap {
        &self.types
    }

    pub fn codes(&self, type_: u16) -> Option<&Bitmap> {
        match type_ {
            EV_KEY => Some(&self.keys),
            EV_REL => Some(&self.relative),
            EV_ABS => Some(&self.absolute),
            EV_MSC => Some(&self.misc),
            _ => None,
        }
    }

    fn codes_mut(&mut self, type_: u16) -> Option<&mut Bitmap> {
        match type_ {
            EV_KEY => Some(&mut self.keys),
            EV_REL => Some(&mut self.relative),
            EV_ABS => Some(&mut self.absolute),
            EV_MSC => Some(&mut self.misc),
            _ => None,
        }
    }

    pub fn abs_info(&self, code: u16) -> Option<&AbsInfo> {
        self.abs_info.get(&code)
    }

    pub fn has_type(&self, type_: u16) -> bool {
        self.types.contains(type_)
    }

    pub fn has_code(&self, type_: u16, code: u16) -> bool {
        self.codes(type_).map_or(false, |codes| codes.contains(code))
    }

    /// Only mirrored event types are accepted.
    pub fn insert_type(&mut self, type_: u16) -> bool {
        MIRRORED_TYPES.contains(&type_) && self.types.insert(type_)
    }

    /// Enables a key, relative axis or misc code. The event type has to be enabled first, and
    /// absolute axes go through `insert_abs` since they need their metadata.
    pub fn insert_code(&mut self, type_: u16, code: u16) -> bool {
        if type_ == EV_ABS || !self.types.contains(type_) {
            return false;
        }

        match self.codes_mut(type_) {
            Some(codes) => codes.insert(code),
            None => false,
        }
    }

    pub fn insert_abs(&mut self, code: u16, info: AbsInfo) -> bool {
        if !self.types.contains(EV_ABS) || !self.absolute.insert(code) {
            return false;
        }

        self.abs_info.insert(code, info);
        true
    }

    /// The declarations that reproduce this set on a virtual device, in the order they have to
    /// be issued: event types first, then keys, relative axes, absolute axes and misc codes.
    pub fn declarations(&self) -> Vec<Declaration> {
        let mut declarations: Vec<_> = self.types.iter().map(Declaration::EventType).collect();
        declarations.extend(self.keys.iter().map(Declaration::Key));
        declarations.extend(self.relative.iter().map(Declaration::Rel));
        declarations.extend(self.absolute.iter().map(|code| Declaration::Abs {
            code,
            info: self.abs_info.get(&code).copied().unwrap_or_default(),
        }));
        declarations.extend(self.misc.iter().map(Declaration::Misc));
        declarations
    }
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilitySet")
            .field("types", &self.types)
            .field("keys", &self.keys)
            .field("relative", &self.relative)
            .field("absolute", &self.abs_info)
            .field("misc", &self.misc)
            .finish()
    }
}

impl FromIterator<Declaration> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Declaration>>(iter: I) -> Self {
        let mut set = CapabilitySet::new();
        for declaration in iter {
            match declaration {
                Declaration::EventType(type_) => {
                    set.insert_type(type_);
                }
                Declaration::Key(code) => {
                    set.insert_code(EV_KEY, code);
                }
                Declaration::Rel(code) => {
                    set.insert_code(EV_REL, code);
                }
                Declaration::Abs { code, info } => {
                    set.insert_abs(code, info);
                }
                Declaration::Misc(code) => {
                    set.insert_code(EV_MSC, code);
                }
            }
        }

        set
    }
}

/// A device whose capabilities can be queried.
pub trait CapabilitySource {
    /// Fills `bitmap` with the codes supported for `type_`. Type `0` queries the event types
    /// themselves.
    fn query_bits(&self, type_: u16, bitmap: &mut Bitmap) -> Result<(), Error>;

    fn query_abs_info(&self, code: u16) -> Result<AbsInfo, Error>;
}

#[derive(Debug, Error)]
pub enum CapabilityQueryError {
    #[error("failed to query supported event types: {0}")]
    EventTypes(#[source] Error),
    #[error("failed to query codes of event type {type_:#x}: {source}")]
    Codes {
        type_: u16,
        #[source]
        source: Error,
    },
    #[error("failed to query absolute axis {code:#x}: {source}")]
    AbsInfo {
        code: u16,
        #[source]
        source: Error,
    },
}

/// Reads the capability set of `source`, restricted to the mirrored event types.
pub fn mirror<S: CapabilitySource + ?Sized>(source: &S) -> Result<CapabilitySet, CapabilityQueryError> {
    let mut reported = Bitmap::new(EV_MAX);
    source
        .query_bits(0, &mut reported)
        .map_err(CapabilityQueryError::EventTypes)?;

    let mut set = CapabilitySet::new();
    for type_ in reported.iter() {
        set.insert_type(type_);
    }

    for type_ in [EV_KEY, EV_REL, EV_ABS, EV_MSC] {
        if !set.has_type(type_) {
            continue;
        }

        let mut codes = Bitmap::new(max_code(type_).unwrap_or(0));
        source
            .query_bits(type_, &mut codes)
            .map_err(|source| CapabilityQueryError::Codes { type_, source })?;

        for code in codes.iter() {
            if type_ == EV_ABS {
                let info = source
                    .query_abs_info(code)
                    .map_err(|source| CapabilityQueryError::AbsInfo { code, source })?;
                set.insert_abs(code, info);
            } else {
                set.insert_code(type_, code);
            }
        }
    }

    Ok(set)
}
