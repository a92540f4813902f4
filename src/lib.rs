//! # Cluster Progress Monitor
//!
//! Streams provisioning progress for k0rdent `ClusterDeployment` resources.
//!
//! ## Overview
//!
//! The monitor correlates two noisy sources into one ordered stream of
//! [`progress::ProgressUpdate`]s per resource:
//!
//! 1. **Status conditions** - the resource's own `InfrastructureReady`,
//!    `ControlPlaneInitialized`, `WorkersAvailable` and `Ready` conditions
//! 2. **Namespace events** - events on the resource and on subsidiary objects
//!    created for it (service sets, clusters, machine deployments)
//!
//! Both are reduced to a coarse [`progress::ProvisioningPhase`] by a pure
//! classifier. The [`monitor::SubscriptionManager`] runs one worker per
//! subscribed resource, coalesces repeated updates, enforces per-caller and
//! global quotas and ends every stream with a terminal update.
//!
//! ## Modules
//!
//! - [`crd`] - typed `ClusterDeployment` resource
//! - [`progress`] - phase classification and event scoping
//! - [`monitor`] - subscriptions, quotas and Kubernetes collaborators
//! - [`config`] - environment configuration
//! - [`observability`] - Prometheus metrics and probe server
//! - [`runtime`] - process startup and watch error policy

pub mod config;
pub mod constants;
pub mod crd;
pub mod monitor;
pub mod observability;
pub mod progress;
pub mod runtime;
