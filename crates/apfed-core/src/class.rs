//! Explicit class-tag enum plus a statically declared parent table, standing
//! in for the runtime class ancestry a reflective implementation would use.
//! "Most specific registered ancestor" is a walk up this table.

use std::fmt;

/// Activity Streams 2.0 vocabulary classes relevant to dispatch. This is not
/// exhaustive of the vocabulary; it covers the classes inbox listeners,
/// actor dispatch, and collection handling need to distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClassTag {
    Object,
    Actor,
    Person,
    Service,
    Group,
    Application,
    Organization,
    Activity,
    Accept,
    Reject,
    TentativeAccept,
    TentativeReject,
    Follow,
    Undo,
    Create,
    Update,
    Delete,
    Like,
    Announce,
    Block,
    Add,
    Remove,
    Flag,
    Move,
    Collection,
    OrderedCollection,
    CollectionPage,
    OrderedCollectionPage,
}

impl ClassTag {
    /// The JSON-LD `@type` string this tag round-trips with.
    pub fn as_str(self) -> &'static str {
        match self {
            ClassTag::Object => "Object",
            ClassTag::Actor => "Actor",
            ClassTag::Person => "Person",
            ClassTag::Service => "Service",
            ClassTag::Group => "Group",
            ClassTag::Application => "Application",
            ClassTag::Organization => "Organization",
            ClassTag::Activity => "Activity",
            ClassTag::Accept => "Accept",
            ClassTag::Reject => "Reject",
            ClassTag::TentativeAccept => "TentativeAccept",
            ClassTag::TentativeReject => "TentativeReject",
            ClassTag::Follow => "Follow",
            ClassTag::Undo => "Undo",
            ClassTag::Create => "Create",
            ClassTag::Update => "Update",
            ClassTag::Delete => "Delete",
            ClassTag::Like => "Like",
            ClassTag::Announce => "Announce",
            ClassTag::Block => "Block",
            ClassTag::Add => "Add",
            ClassTag::Remove => "Remove",
            ClassTag::Flag => "Flag",
            ClassTag::Move => "Move",
            ClassTag::Collection => "Collection",
            ClassTag::OrderedCollection => "OrderedCollection",
            ClassTag::CollectionPage => "CollectionPage",
            ClassTag::OrderedCollectionPage => "OrderedCollectionPage",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "Object" => ClassTag::Object,
            "Actor" => ClassTag::Actor,
            "Person" => ClassTag::Person,
            "Service" => ClassTag::Service,
            "Group" => ClassTag::Group,
            "Application" => ClassTag::Application,
            "Organization" => ClassTag::Organization,
            "Activity" => ClassTag::Activity,
            "Accept" => ClassTag::Accept,
            "Reject" => ClassTag::Reject,
            "TentativeAccept" => ClassTag::TentativeAccept,
            "TentativeReject" => ClassTag::TentativeReject,
            "Follow" => ClassTag::Follow,
            "Undo" => ClassTag::Undo,
            "Create" => ClassTag::Create,
            "Update" => ClassTag::Update,
            "Delete" => ClassTag::Delete,
            "Like" => ClassTag::Like,
            "Announce" => ClassTag::Announce,
            "Block" => ClassTag::Block,
            "Add" => ClassTag::Add,
            "Remove" => ClassTag::Remove,
            "Flag" => ClassTag::Flag,
            "Move" => ClassTag::Move,
            "Collection" => ClassTag::Collection,
            "OrderedCollection" => ClassTag::OrderedCollection,
            "CollectionPage" => ClassTag::CollectionPage,
            "OrderedCollectionPage" => ClassTag::OrderedCollectionPage,
            _ => return None,
        })
    }

    /// The immediate parent class, or `None` for the roots (`Object`).
    pub fn parent(self) -> Option<ClassTag> {
        match self {
            ClassTag::Object => None,
            ClassTag::Actor => Some(ClassTag::Object),
            ClassTag::Person
            | ClassTag::Service
            | ClassTag::Group
            | ClassTag::Application
            | ClassTag::Organization => Some(ClassTag::Actor),
            ClassTag::Activity => Some(ClassTag::Object),
            ClassTag::Accept | ClassTag::Reject => Some(ClassTag::Activity),
            ClassTag::TentativeAccept => Some(ClassTag::Accept),
            ClassTag::TentativeReject => Some(ClassTag::Reject),
            ClassTag::Follow
            | ClassTag::Undo
            | ClassTag::Create
            | ClassTag::Update
            | ClassTag::Delete
            | ClassTag::Like
            | ClassTag::Announce
            | ClassTag::Block
            | ClassTag::Add
            | ClassTag::Remove
            | ClassTag::Flag
            | ClassTag::Move => Some(ClassTag::Activity),
            ClassTag::Collection => Some(ClassTag::Object),
            ClassTag::OrderedCollection => Some(ClassTag::Collection),
            ClassTag::CollectionPage => Some(ClassTag::Collection),
            ClassTag::OrderedCollectionPage => Some(ClassTag::OrderedCollection),
        }
    }

    /// This class and every ancestor, most specific first.
    pub fn ancestry(self) -> Vec<ClassTag> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(parent) = current.parent() {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    pub fn is_ancestor_of(self, other: ClassTag) -> bool {
        other.ancestry().contains(&self)
    }
}

impl fmt::Display for ClassTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
