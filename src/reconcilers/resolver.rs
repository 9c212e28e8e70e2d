//! Resolution of a connector's Connect cluster from its cluster label
//!
//! A connector names its cluster only by name, and both a KafkaConnect and
//! a KafkaConnectS2I may carry that name. The first kind in
//! [`ParentKind::PRIORITY`] that exists wins; the others are reported as an
//! ambiguity warning and otherwise ignored.

use std::fmt;
use std::sync::Arc;

use kube::ResourceExt;
use tracing::warn;

use crate::adapters::ResourceStore;
use crate::crd::{KafkaConnect, KafkaConnectS2I, KafkaConnector, ParentKind, CLUSTER_LABEL};
use crate::error::{Error, Result};

/// A resolved Connect cluster
#[derive(Clone, Debug)]
pub enum Parent {
    Connect(KafkaConnect),
    ConnectS2I(KafkaConnectS2I),
}

impl Parent {
    pub fn kind(&self) -> ParentKind {
        match self {
            Parent::Connect(_) => ParentKind::KafkaConnect,
            Parent::ConnectS2I(_) => ParentKind::KafkaConnectS2I,
        }
    }
}

/// More than one kind of cluster matched a connector's cluster label
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AmbiguousReference {
    pub namespace: String,
    pub name: String,
    pub chosen: ParentKind,
    pub shadowed: Vec<ParentKind>,
}

impl fmt::Display for AmbiguousReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shadowed: Vec<&str> = self.shadowed.iter().map(ParentKind::as_str).collect();
        write!(
            f,
            "There is both a {} resource and a {} resource named {} in namespace {}. The {} takes precedence",
            self.chosen,
            shadowed.join(" and a "),
            self.name,
            self.namespace,
            self.chosen
        )
    }
}

/// Outcome of a successful resolution
#[derive(Clone, Debug)]
pub struct Resolution {
    pub parent: Parent,
    pub ambiguity: Option<AmbiguousReference>,
}

/// Looks up the Connect cluster a connector belongs to
pub struct ParentResolver {
    connect: Arc<dyn ResourceStore<KafkaConnect>>,
    connect_s2i: Option<Arc<dyn ResourceStore<KafkaConnectS2I>>>,
}

impl ParentResolver {
    /// `connect_s2i` is `None` on platforms without KafkaConnectS2I
    pub fn new(
        connect: Arc<dyn ResourceStore<KafkaConnect>>,
        connect_s2i: Option<Arc<dyn ResourceStore<KafkaConnectS2I>>>,
    ) -> Self {
        Self {
            connect,
            connect_s2i,
        }
    }

    /// Resolve the cluster named by the connector's cluster label
    ///
    /// A missing label is a configuration error and no lookup is made.
    pub async fn resolve(&self, connector: &KafkaConnector) -> Result<Resolution> {
        let Some(cluster) = connector.cluster_label() else {
            return Err(missing_label());
        };
        let namespace = connector.namespace().ok_or_else(|| {
            Error::config(format!("KafkaConnector {} has no namespace", connector.name_any()))
        })?;
        self.resolve_name(&namespace, cluster).await
    }

    /// Resolve a cluster by name in `namespace`
    pub async fn resolve_name(&self, namespace: &str, name: &str) -> Result<Resolution> {
        let s2i_lookup = async {
            match &self.connect_s2i {
                Some(store) => store.get(namespace, name).await,
                None => Ok(None),
            }
        };
        let (connect, connect_s2i) =
            futures::try_join!(self.connect.get(namespace, name), s2i_lookup)?;

        let candidates = connect
            .map(Parent::Connect)
            .into_iter()
            .chain(connect_s2i.map(Parent::ConnectS2I))
            .collect();
        let resolution = select(namespace, name, candidates)?;
        if let Some(ambiguity) = &resolution.ambiguity {
            warn!(namespace = %namespace, cluster = %name, "{}", ambiguity);
        }
        Ok(resolution)
    }
}

/// Configuration error for a connector without a cluster label
pub fn missing_label() -> Error {
    Error::config(format!(
        "Resource lacks label '{}': No connect cluster in which to create this connector.",
        CLUSTER_LABEL
    ))
}

/// Not-found error for a cluster name that matched nothing
pub fn no_connect_cluster(namespace: &str, name: &str) -> Error {
    Error::not_found(format!(
        "KafkaConnect resource '{}' identified by label '{}' does not exist in namespace {}.",
        name, CLUSTER_LABEL, namespace
    ))
}

/// Pick the highest-priority candidate
pub fn select(namespace: &str, name: &str, mut candidates: Vec<Parent>) -> Result<Resolution> {
    candidates.sort_by_key(|parent| {
        ParentKind::PRIORITY
            .iter()
            .position(|kind| *kind == parent.kind())
            .unwrap_or(usize::MAX)
    });

    let mut ranked = candidates.into_iter();
    let parent = ranked
        .next()
        .ok_or_else(|| no_connect_cluster(namespace, name))?;
    let shadowed: Vec<ParentKind> = ranked.map(|p| p.kind()).collect();
    let ambiguity = (!shadowed.is_empty()).then(|| AmbiguousReference {
        namespace: namespace.to_string(),
        name: name.to_string(),
        chosen: parent.kind(),
        shadowed,
    });

    Ok(Resolution { parent, ambiguity })
}
