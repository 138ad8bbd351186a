use smallvec::SmallVec;
use smartstring::alias::String as SmartString;
use std::fmt;

/// Leading character of every identifier the reconciler writes, and the
/// separator between path segments.
pub const SEPARATOR: char = '.';

/// Marks a segment derived from an element key rather than a position.
pub const KEY_PREFIX: char = '$';

const SERVER_ROOT_MARKER: char = 'r';
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Prefix-structured key naming a node's position in a mounted tree.
///
/// A root looks like `.3`; its children look like `.3.0`, `.3.1` or, when
/// keyed, `.3.$item`. An identifier is a strict ancestor of another when the
/// other starts with it followed by [`SEPARATOR`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(SmartString);

impl Identifier {
    /// Root identifier for the `index`-th root minted by a context.
    pub fn root(index: u64) -> Self {
        let mut id = SmartString::new();
        id.push(SEPARATOR);
        id.push_str(&index.to_string());
        Self(id)
    }

    /// Root identifier for server-rendered markup: `.r` followed by `index`
    /// in base 36. Never equal to a root minted by [`Identifier::root`].
    pub fn server_root(index: u64) -> Self {
        let mut digits = SmallVec::<[u8; 13]>::new();
        let mut rest = index;
        loop {
            digits.push(BASE36[(rest % 36) as usize]);
            rest /= 36;
            if rest == 0 {
                break;
            }
        }
        let mut id = SmartString::new();
        id.push(SEPARATOR);
        id.push(SERVER_ROOT_MARKER);
        id.extend(digits.iter().rev().map(|&b| char::from(b)));
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the identifier was written by a reconciler mount.
    pub fn is_reconciler_id(&self) -> bool {
        self.0.starts_with(SEPARATOR)
    }

    /// Positional child identifier.
    pub fn child_at(&self, index: usize) -> Self {
        let mut id = self.0.clone();
        id.push(SEPARATOR);
        id.push_str(&index.to_string());
        Self(id)
    }

    /// Keyed child identifier. Separators inside the key are replaced so the
    /// key stays a single segment.
    pub fn child_keyed(&self, key: &str) -> Self {
        let mut id = self.0.clone();
        id.push(SEPARATOR);
        id.push(KEY_PREFIX);
        for ch in key.chars() {
            id.push(if ch == SEPARATOR { ':' } else { ch });
        }
        Self(id)
    }

    /// Identifier of the root this one lives under.
    pub fn root_prefix(&self) -> Identifier {
        let skip = usize::from(self.is_reconciler_id());
        match self.0[skip..].find(SEPARATOR) {
            Some(pos) => Self(self.0[..pos + skip].into()),
            None => self.clone(),
        }
    }

    /// Strict ancestor test: `.1` is an ancestor of `.1.0` but not of `.10`
    /// and not of itself.
    pub fn is_ancestor_of(&self, other: &Identifier) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(self.0.as_str())
            && other.0[self.0.len()..].starts_with(SEPARATOR)
    }

    /// Every identifier on the path from the root down to `self`, inclusive.
    pub fn ancestors(&self) -> impl Iterator<Item = Identifier> + '_ {
        let root_len = self.root_prefix().0.len();
        let mut ends: SmallVec<[usize; 8]> = self.0[root_len..]
            .match_indices(SEPARATOR)
            .map(|(pos, _)| pos + root_len)
            .collect();
        ends.push(self.0.len());
        ends.into_iter()
            .map(move |end| Identifier(self.0[..end].into()))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
