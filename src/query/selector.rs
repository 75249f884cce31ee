/// A typed field comparison. `rank` fixes evaluation order inside a `Query`.
pub trait Selector {
    fn rank(&self) -> u8;

    /// Mask bit of the selected field
    fn bit(&self) -> u16 {
        1 << self.rank()
    }
}

/// Field of an account row to compare against, with its value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldSelector {
    Name(String),
    Password(String),
    Uid(i64),
    Gid(i64),
    Comment(String),
    Home(String),
    Shell(String),
    /// Matches every row
    All,
}

impl Selector for FieldSelector {
    fn rank(&self) -> u8 {
        match self {
            FieldSelector::Name(_) => 0,
            FieldSelector::Password(_) => 1,
            FieldSelector::Uid(_) => 2,
            FieldSelector::Gid(_) => 3,
            FieldSelector::Comment(_) => 4,
            FieldSelector::Home(_) => 5,
            FieldSelector::Shell(_) => 6,
            FieldSelector::All => 7,
        }
    }
}

/// Field of a credential row to compare against
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialSelector {
    Name(String),
    Password(String),
    All,
}

impl Selector for CredentialSelector {
    fn rank(&self) -> u8 {
        match self {
            CredentialSelector::Name(_) => 0,
            CredentialSelector::Password(_) => 1,
            CredentialSelector::All => 7,
        }
    }
}

/// One or more selectors, kept in evaluation order.
/// A row matches when the first satisfied selector is found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query<S> {
    selectors: Vec<S>,
}

impl<S: Selector> Query<S> {
    pub fn new(mut selectors: Vec<S>) -> Self {
        selectors.sort_by_key(|s| s.rank());
        Self { selectors }
    }

    pub fn single(selector: S) -> Self {
        Self {
            selectors: vec![selector],
        }
    }

    pub fn selectors(&self) -> &[S] {
        &self.selectors
    }

    /// Combined mask of every selected field
    pub fn mask(&self) -> u16 {
        self.selectors.iter().fold(0, |acc, s| acc | s.bit())
    }

    /// Returns the first selector in evaluation order that `is_match` accepts
    pub fn first_match<F>(&self, mut is_match: F) -> Option<&S>
    where
        F: FnMut(&S) -> bool,
    {
        self.selectors.iter().find(|s| is_match(s))
    }
}

impl Query<FieldSelector> {
    pub fn all() -> Self {
        Self::single(FieldSelector::All)
    }
}

impl Query<CredentialSelector> {
    pub fn all_credentials() -> Self {
        Self::single(CredentialSelector::All)
    }
}
