//! Catalog snapshot loading.
//!
//! The catalog is supplied once, up front, as JSON: either a bare array of
//! entries or the `{"data": {"repos": [...]}}` envelope returned by the
//! catalog query. Everything downstream borrows the snapshot read-only.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// One image family in the curated catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Repository name, unique within a snapshot, e.g. `"nginx"`.
    pub name: String,
    /// Catalog tier. Empty means the entry isn't publicly resolvable.
    #[serde(default, rename = "catalogTier", deserialize_with = "nullable")]
    pub tier: String,
    /// Upstream references known to correspond to this entry.
    #[serde(default, deserialize_with = "nullable")]
    pub aliases: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub active_tags: Vec<String>,
    /// Tags that were published once but are no longer updated.
    #[serde(default, deserialize_with = "nullable")]
    pub inactive_tags: Vec<String>,
}

impl CatalogEntry {
    pub fn new(name: &str, tier: &str) -> Self {
        CatalogEntry {
            name: name.to_string(),
            tier: tier.to_string(),
            ..Default::default()
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.active_tags = tags.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Returns the tags eligible for matching, active ones first.
    pub fn tags(&self, include_inactive: bool) -> Vec<&str> {
        let inactive: &[String] = if include_inactive {
            &self.inactive_tags
        } else {
            &[]
        };
        self.active_tags
            .iter()
            .chain(inactive)
            .map(String::as_str)
            .collect()
    }
}

fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    Entries(Vec<CatalogEntry>),
    Envelope { data: RepoList },
}

#[derive(Deserialize)]
struct RepoList {
    repos: Vec<CatalogEntry>,
}

/// An immutable snapshot of the catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Catalog { entries }
    }

    /// Decodes a snapshot from JSON.
    ///
    /// An empty entry list is treated as a provider failure rather than an
    /// empty catalog, since mapping against nothing is never what the caller wants.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let entries = match serde_json::from_slice(data)? {
            CatalogDocument::Entries(entries) => entries,
            CatalogDocument::Envelope { data } => data.repos,
        };
        if entries.is_empty() {
            return Err(Error::Catalog("catalog contains no repositories".to_string()));
        }
        Ok(Catalog { entries })
    }

    /// Reads and decodes a snapshot from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces aliases that are known to be wrong in the upstream catalog data.
    ///
    /// Several image families list every sibling's upstream image as an alias
    /// of each member, which makes every member match every upstream image.
    pub fn with_alias_fixes(mut self) -> Self {
        for entry in &mut self.entries {
            if let Some((_, aliases)) = ALIAS_FIXES.iter().find(|(name, _)| *name == entry.name) {
                entry.aliases = aliases.iter().map(|s| s.to_string()).collect();
            }
        }
        self
    }
}

const ALIAS_FIXES: &[(&str, &[&str])] = &[
    ("argo-cli", &["quay.io/argoproj/argocli"]),
    ("argo-cli-fips", &["quay.io/argoproj/argocli"]),
    ("argo-events", &["quay.io/argoproj/argo-events"]),
    ("argo-events-fips", &["quay.io/argoproj/argo-events"]),
    ("argo-exec", &["quay.io/argoproj/argoexec"]),
    ("argo-exec-fips", &["quay.io/argoproj/argoexec"]),
    ("argo-workflowcontroller", &["quay.io/argoproj/workflow-controller"]),
    ("argo-workflowcontroller-fips", &["quay.io/argoproj/workflow-controller"]),
    ("crossplane-aws", &["ghcr.io/crossplane-contrib/provider-family-aws"]),
    ("crossplane-aws-cloudformation", &["ghcr.io/crossplane-contrib/provider-aws-cloudformation"]),
    ("crossplane-aws-cloudformation-fips", &["ghcr.io/crossplane-contrib/provider-aws-cloudformation"]),
    ("crossplane-aws-cloudfront", &["ghcr.io/crossplane-contrib/provider-aws-cloudfront"]),
    ("crossplane-aws-cloudfront-fips", &["ghcr.io/crossplane-contrib/provider-aws-cloudfront"]),
    ("crossplane-aws-cloudwatchlogs", &["ghcr.io/crossplane-contrib/provider-aws-cloudwatchlogs"]),
    ("crossplane-aws-cloudwatchlogs-fips", &["ghcr.io/crossplane-contrib/provider-aws-cloudwatchlogs"]),
    ("crossplane-aws-dynamodb", &["ghcr.io/crossplane-contrib/provider-aws-dynamodb"]),
    ("crossplane-aws-dynamodb-fips", &["ghcr.io/crossplane-contrib/provider-aws-dynamodb"]),
    ("crossplane-aws-ec2", &["ghcr.io/crossplane-contrib/provider-aws-ec2"]),
    ("crossplane-aws-ec2-fips", &["ghcr.io/crossplane-contrib/provider-aws-ec2"]),
    ("crossplane-aws-eks", &["ghcr.io/crossplane-contrib/provider-aws-eks"]),
    ("crossplane-aws-eks-fips", &["ghcr.io/crossplane-contrib/provider-aws-eks"]),
    ("crossplane-aws-fips", &["ghcr.io/crossplane-contrib/provider-family-aws"]),
    ("crossplane-aws-firehose", &["ghcr.io/crossplane-contrib/provider-aws-firehose"]),
    ("crossplane-aws-firehose-fips", &["ghcr.io/crossplane-contrib/provider-aws-firehose"]),
    ("crossplane-aws-iam", &["ghcr.io/crossplane-contrib/provider-aws-iam"]),
    ("crossplane-aws-iam-fips", &["ghcr.io/crossplane-contrib/provider-aws-iam"]),
    ("crossplane-aws-kinesis", &["ghcr.io/crossplane-contrib/provider-aws-kinesis"]),
    ("crossplane-aws-kinesis-fips", &["ghcr.io/crossplane-contrib/provider-aws-kinesis"]),
    ("crossplane-aws-kms", &["ghcr.io/crossplane-contrib/provider-aws-kms"]),
    ("crossplane-aws-kms-fips", &["ghcr.io/crossplane-contrib/provider-aws-kms"]),
    ("crossplane-aws-lambda", &["ghcr.io/crossplane-contrib/provider-aws-lambda"]),
    ("crossplane-aws-lambda-fips", &["ghcr.io/crossplane-contrib/provider-aws-lambda"]),
    ("crossplane-aws-rds", &["ghcr.io/crossplane-contrib/provider-aws-rds"]),
    ("crossplane-aws-rds-fips", &["ghcr.io/crossplane-contrib/provider-aws-rds"]),
    ("crossplane-aws-route53", &["ghcr.io/crossplane-contrib/provider-aws-route53"]),
    ("crossplane-aws-route53-fips", &["ghcr.io/crossplane-contrib/provider-aws-route53"]),
    ("crossplane-aws-s3", &["ghcr.io/crossplane-contrib/provider-aws-s3"]),
    ("crossplane-aws-s3-fips", &["ghcr.io/crossplane-contrib/provider-aws-s3"]),
    ("crossplane-aws-sns", &["ghcr.io/crossplane-contrib/provider-aws-sns"]),
    ("crossplane-aws-sns-fips", &["ghcr.io/crossplane-contrib/provider-aws-sns"]),
    ("crossplane-aws-sqs", &["ghcr.io/crossplane-contrib/provider-aws-sqs"]),
    ("crossplane-aws-sqs-fips", &["ghcr.io/crossplane-contrib/provider-aws-sqs"]),
    ("cert-manager-acmesolver", &["quay.io/jetstack/cert-manager-acmesolver"]),
    ("cert-manager-acmesolver-fips", &["quay.io/jetstack/cert-manager-acmesolver"]),
    ("cert-manager-acmesolver-iamguarded", &["quay.io/jetstack/cert-manager-acmesolver"]),
    ("cert-manager-acmesolver-iamguarded-fips", &["quay.io/jetstack/cert-manager-acmesolver"]),
    ("cert-manager-cainjector", &["quay.io/jetstack/cert-manager-cainjector"]),
    ("cert-manager-cainjector-fips", &["quay.io/jetstack/cert-manager-cainjector"]),
    ("cert-manager-cainjector-iamguarded", &["quay.io/jetstack/cert-manager-cainjector"]),
    ("cert-manager-cainjector-iamguarded-fips", &["quay.io/jetstack/cert-manager-cainjector"]),
    ("cert-manager-cmctl", &["quay.io/jetstack/cmctl"]),
    ("cert-manager-cmctl-fips", &["quay.io/jetstack/cmctl"]),
    ("cert-manager-webhook", &["quay.io/jetstack/cert-manager-webhook"]),
    ("cert-manager-webhook-fips", &["quay.io/jetstack/cert-manager-webhook"]),
    ("cert-manager-webhook-iamguarded", &["quay.io/jetstack/cert-manager-webhook"]),
    ("cert-manager-webhook-iamguarded-fips", &["quay.io/jetstack/cert-manager-webhook"]),
    ("flux", &["ghcr.io/fluxcd/flux-cli"]),
    ("flux-fips", &["ghcr.io/fluxcd/flux-cli"]),
    ("flux-helm-controller", &["ghcr.io/fluxcd/helm-controller"]),
    ("flux-helm-controller-fips", &["ghcr.io/fluxcd/helm-controller"]),
    ("flux-image-automation-controller", &["ghcr.io/fluxcd/image-automation-controller"]),
    ("flux-image-automation-controller-fips", &["ghcr.io/fluxcd/image-automation-controller"]),
    ("flux-image-reflector-controller", &["ghcr.io/fluxcd/image-reflector-controller"]),
    ("flux-image-reflector-controller-fips", &["ghcr.io/fluxcd/image-reflector-controller"]),
    ("flux-kustomize-controller", &["ghcr.io/fluxcd/kustomize-controller"]),
    ("flux-kustomize-controller-fips", &["ghcr.io/fluxcd/kustomize-controller"]),
    ("flux-notification-controller", &["ghcr.io/fluxcd/notification-controller"]),
    ("flux-notification-controller-fips", &["ghcr.io/fluxcd/notification-controller"]),
    ("flux-source-controller", &["ghcr.io/fluxcd/source-controller"]),
    ("flux-source-controller-fips", &["ghcr.io/fluxcd/source-controller"]),
    ("minio-client", &["quay.io/minio/mc"]),
    ("minio-client-fips", &["quay.io/minio/mc"]),
    ("minio-operator", &["quay.io/minio/operator"]),
    ("minio-operator-fips", &["quay.io/minio/operator"]),
    ("minio-operator-sidecar", &["quay.io/minio/operator-sidecar"]),
    ("minio-operator-sidecar-fips", &["quay.io/minio/operator-sidecar"]),
    ("mongodb-kubernetes-operator-readinessprobe", &["quay.io/mongodb/mongodb-kubernetes-readinessprobe"]),
    ("mongodb-kubernetes-operator-readinessprobe-fips", &["quay.io/mongodb/mongodb-kubernetes-readinessprobe"]),
    ("mongodb-kubernetes-operator-version-upgrade-post-start-hook", &["quay.io/mongodb/mongodb-kubernetes-operator-version-upgrade-post-start-hook"]),
    ("mongodb-kubernetes-operator-version-upgrade-post-start-hook-fips", &["quay.io/mongodb/mongodb-kubernetes-operator-version-upgrade-post-start-hook"]),
    ("postgres-cloudnative-pg", &["ghcr.io/cloudnative-pg/postgresql"]),
    ("postgres-cloudnative-pg-fips", &["ghcr.io/cloudnative-pg/postgresql"]),
    ("vault-k8s", &["hashicorp/vault-k8s"]),
];
