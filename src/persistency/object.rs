//! # Local Objects
//!
//! The objects an item stores in its clusters, and their XML marshalling.
//!
//! Structured objects (properties, events, viewpoints, jobs, collections) are marshalled with
//! quick-xml's serde support. Outcomes and the lifecycle are already XML documents and are
//! stored verbatim; their identity is carried by the cluster path instead.

use crate::error::{KernelError, Result};
use crate::lookup::ItemPath;
use crate::persistency::cluster::{ClusterType, cluster_type_of, normalize_path};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the single object stored in the lifecycle cluster
pub const WORKFLOW_NAME: &str = "workflow";

/// Collection version segment used when no version number is set
pub const LAST_VERSION: &str = "last";

fn default_true() -> bool {
    true
}

/// Named property of an item
///
/// The value is marshalled as an attribute so that surrounding whitespace survives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "Property")]
pub struct Property {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@mutable", default = "default_true")]
    pub mutable: bool,
    #[serde(rename = "@value", default)]
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mutable: true,
            value: value.into(),
        }
    }

    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }
}

/// Audit trail entry recording one transition of one activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "Event")]
pub struct Event {
    #[serde(rename = "@id")]
    pub id: i32,
    #[serde(rename = "@itemPath")]
    pub item_path: ItemPath,
    #[serde(rename = "@agentPath")]
    pub agent_path: ItemPath,
    #[serde(rename = "@agentRole", default, skip_serializing_if = "Option::is_none")]
    pub agent_role: Option<String>,
    #[serde(rename = "@stepName")]
    pub step_name: String,
    #[serde(rename = "@stepPath")]
    pub step_path: String,
    #[serde(rename = "@stepType")]
    pub step_type: String,
    #[serde(rename = "@transition")]
    pub transition: i32,
    #[serde(rename = "@originState")]
    pub origin_state: i32,
    #[serde(rename = "@targetState")]
    pub target_state: i32,
    #[serde(rename = "@schemaName", default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    #[serde(rename = "@schemaVersion", default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<i32>,
    #[serde(rename = "@viewName", default, skip_serializing_if = "Option::is_none")]
    pub view_name: Option<String>,
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Named pointer to the outcome of a given schema that was stored by a given event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "Viewpoint")]
pub struct Viewpoint {
    #[serde(rename = "@itemPath")]
    pub item_path: ItemPath,
    #[serde(rename = "@schemaName")]
    pub schema_name: String,
    #[serde(rename = "@schemaVersion")]
    pub schema_version: i32,
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@eventId")]
    pub event_id: i32,
}

impl Viewpoint {
    pub fn new(
        item_path: ItemPath,
        schema_name: impl Into<String>,
        schema_version: i32,
        name: impl Into<String>,
        event_id: i32,
    ) -> Self {
        Self {
            item_path,
            schema_name: schema_name.into(),
            schema_version,
            name: name.into(),
            event_id,
        }
    }

    /// Cluster path of the outcome this viewpoint points to
    pub fn outcome_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            ClusterType::Outcome.name(),
            self.schema_name,
            self.schema_version,
            self.event_id
        )
    }
}

/// Data document submitted by an agent, validated against a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub schema_name: String,
    pub schema_version: i32,
    pub event_id: i32,
    pub data: String,
}

impl Outcome {
    pub fn new(
        schema_name: impl Into<String>,
        schema_version: i32,
        event_id: i32,
        data: impl Into<String>,
    ) -> Self {
        Self {
            schema_name: schema_name.into(),
            schema_version,
            event_id,
            data: data.into(),
        }
    }
}

/// Activity that an agent with the right role may execute on an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "Job")]
pub struct Job {
    #[serde(rename = "@id")]
    pub id: i32,
    #[serde(rename = "@itemPath")]
    pub item_path: ItemPath,
    #[serde(rename = "@stepName")]
    pub step_name: String,
    #[serde(rename = "@stepPath")]
    pub step_path: String,
    #[serde(rename = "@stepType")]
    pub step_type: String,
    #[serde(rename = "@transition")]
    pub transition: String,
    #[serde(rename = "@originState")]
    pub origin_state: String,
    #[serde(rename = "@targetState")]
    pub target_state: String,
    #[serde(rename = "@agentRole", default, skip_serializing_if = "Option::is_none")]
    pub agent_role: Option<String>,
    #[serde(rename = "@agentPath", default, skip_serializing_if = "Option::is_none")]
    pub agent_path: Option<ItemPath>,
    #[serde(rename = "@creationDate")]
    pub creation_date: DateTime<Utc>,
}

/// Slot of a collection, optionally assigned to a child item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMember {
    #[serde(rename = "@id")]
    pub id: i32,
    #[serde(rename = "@childPath", default, skip_serializing_if = "Option::is_none")]
    pub child_path: Option<ItemPath>,
    #[serde(rename = "@classProps", default)]
    pub class_props: String,
}

/// Named, versioned set of references to other items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "Collection")]
pub struct Collection {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
    #[serde(rename = "Member", default)]
    pub members: Vec<CollectionMember>,
}

impl Collection {
    pub fn new(name: impl Into<String>, version: Option<i32>) -> Self {
        Self {
            name: name.into(),
            version,
            members: Vec::new(),
        }
    }

    /// Append a member slot and return its id
    pub fn add_member(&mut self, child_path: Option<ItemPath>, class_props: &str) -> i32 {
        let id = self.members.iter().map(|m| m.id + 1).max().unwrap_or(0);
        self.members.push(CollectionMember {
            id,
            child_path,
            class_props: class_props.to_string(),
        });
        id
    }

    pub fn version_name(&self) -> String {
        self.version
            .map(|v| v.to_string())
            .unwrap_or_else(|| LAST_VERSION.to_string())
    }
}

/// Marshalled workflow of an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    pub xml: String,
}

impl Lifecycle {
    pub fn new(xml: impl Into<String>) -> Self {
        Self { xml: xml.into() }
    }
}

/// Any object that can be stored under an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalObject {
    Property(Property),
    Event(Event),
    Viewpoint(Viewpoint),
    Outcome(Outcome),
    Job(Job),
    Collection(Collection),
    Lifecycle(Lifecycle),
}

impl LocalObject {
    /// Last segment of the object's cluster path
    pub fn name(&self) -> String {
        match self {
            LocalObject::Property(p) => p.name.clone(),
            LocalObject::Event(e) => e.id.to_string(),
            LocalObject::Viewpoint(v) => v.name.clone(),
            LocalObject::Outcome(o) => o.event_id.to_string(),
            LocalObject::Job(j) => j.id.to_string(),
            LocalObject::Collection(c) => c.version_name(),
            LocalObject::Lifecycle(_) => WORKFLOW_NAME.to_string(),
        }
    }

    pub fn cluster_type(&self) -> ClusterType {
        match self {
            LocalObject::Property(_) => ClusterType::Property,
            LocalObject::Event(_) => ClusterType::History,
            LocalObject::Viewpoint(_) => ClusterType::Viewpoint,
            LocalObject::Outcome(_) => ClusterType::Outcome,
            LocalObject::Job(_) => ClusterType::Job,
            LocalObject::Collection(_) => ClusterType::Collection,
            LocalObject::Lifecycle(_) => ClusterType::Lifecycle,
        }
    }

    /// Full path of the object below its item
    pub fn cluster_path(&self) -> String {
        let cluster = self.cluster_type().name();
        match self {
            LocalObject::Viewpoint(v) => format!("{}/{}/{}", cluster, v.schema_name, v.name),
            LocalObject::Outcome(o) => format!(
                "{}/{}/{}/{}",
                cluster, o.schema_name, o.schema_version, o.event_id
            ),
            LocalObject::Collection(c) => format!("{}/{}/{}", cluster, c.name, c.version_name()),
            _ => format!("{}/{}", cluster, self.name()),
        }
    }

    /// Marshal the object to its stored XML form
    pub fn to_xml(&self) -> Result<String> {
        match self {
            LocalObject::Property(p) => quick_xml::se::to_string(p),
            LocalObject::Event(e) => quick_xml::se::to_string(e),
            LocalObject::Viewpoint(v) => quick_xml::se::to_string(v),
            LocalObject::Job(j) => quick_xml::se::to_string(j),
            LocalObject::Collection(c) => quick_xml::se::to_string(c),
            LocalObject::Outcome(o) => return Ok(o.data.clone()),
            LocalObject::Lifecycle(l) => return Ok(l.xml.clone()),
        }
        .map_err(KernelError::from_xml_se)
    }

    /// Unmarshal an object stored at `path`
    ///
    /// The path selects the object kind; for verbatim documents it also supplies the identity.
    /// Structured objects must agree with the path they were read from.
    pub fn from_xml(path: &str, xml: &str) -> Result<LocalObject> {
        let path = normalize_path(path);
        let cluster = cluster_type_of(path)
            .ok_or_else(|| KernelError::InvalidPath(format!("no cluster type in '{}'", path)))?;
        let segments: Vec<&str> = path.split('/').collect();

        let object = match cluster {
            ClusterType::Outcome => {
                if segments.len() != 4 {
                    return Err(KernelError::InvalidPath(format!(
                        "outcome path '{}' must be Outcome/<schema>/<version>/<event>",
                        path
                    )));
                }
                LocalObject::Outcome(Outcome {
                    schema_name: segments[1].to_string(),
                    schema_version: parse_int_segment(path, segments[2])?,
                    event_id: parse_int_segment(path, segments[3])?,
                    data: xml.to_string(),
                })
            }
            ClusterType::Lifecycle => LocalObject::Lifecycle(Lifecycle::new(xml)),
            ClusterType::Property => LocalObject::Property(from_xml_str(xml)?),
            ClusterType::History => LocalObject::Event(from_xml_str(xml)?),
            ClusterType::Viewpoint => LocalObject::Viewpoint(from_xml_str(xml)?),
            ClusterType::Job => LocalObject::Job(from_xml_str(xml)?),
            ClusterType::Collection => LocalObject::Collection(from_xml_str(xml)?),
        };

        let expected = object.cluster_path();
        if expected != path {
            return Err(KernelError::InvalidPath(format!(
                "object read from '{}' belongs at '{}'",
                path, expected
            )));
        }

        Ok(object)
    }

    pub fn as_property(&self) -> Option<&Property> {
        match self {
            LocalObject::Property(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_event(&self) -> Option<&Event> {
        match self {
            LocalObject::Event(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_viewpoint(&self) -> Option<&Viewpoint> {
        match self {
            LocalObject::Viewpoint(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_outcome(&self) -> Option<&Outcome> {
        match self {
            LocalObject::Outcome(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_job(&self) -> Option<&Job> {
        match self {
            LocalObject::Job(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            LocalObject::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_lifecycle(&self) -> Option<&Lifecycle> {
        match self {
            LocalObject::Lifecycle(l) => Some(l),
            _ => None,
        }
    }
}

fn from_xml_str<T: for<'de> Deserialize<'de>>(xml: &str) -> Result<T> {
    quick_xml::de::from_str(xml).map_err(KernelError::from_xml_de)
}

fn parse_int_segment(path: &str, segment: &str) -> Result<i32> {
    segment.parse::<i32>().map_err(|_| {
        KernelError::InvalidPath(format!(
            "'{}' in '{}' is not an integer",
            segment, path
        ))
    })
}

impl From<Property> for LocalObject {
    fn from(value: Property) -> Self {
        LocalObject::Property(value)
    }
}

impl From<Event> for LocalObject {
    fn from(value: Event) -> Self {
        LocalObject::Event(value)
    }
}

impl From<Viewpoint> for LocalObject {
    fn from(value: Viewpoint) -> Self {
        LocalObject::Viewpoint(value)
    }
}

impl From<Outcome> for LocalObject {
    fn from(value: Outcome) -> Self {
        LocalObject::Outcome(value)
    }
}

impl From<Job> for LocalObject {
    fn from(value: Job) -> Self {
        LocalObject::Job(value)
    }
}

impl From<Collection> for LocalObject {
    fn from(value: Collection) -> Self {
        LocalObject::Collection(value)
    }
}

impl From<Lifecycle> for LocalObject {
    fn from(value: Lifecycle) -> Self {
        LocalObject::Lifecycle(value)
    }
}
