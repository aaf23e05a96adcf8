//! Delegate engine
//!
//! Drives one CNI command across a pod's delegate chain. The chain is the
//! cluster network (or the inline delegates), the default networks, then the
//! networks selected by the pod annotation, in that order.
//!
//! ADD attaches delegates in order and, if one fails, detaches the ones
//! already attached in reverse order before reporting. DEL detaches every
//! delegate in reverse order and reports all failures. CHECK stops at the
//! first failing delegate.

use crate::cache::{CachedChain, ChainLink, DelegateCache};
use crate::config::NetConf;
use crate::delegate::DelegateConfig;
use crate::error::EngineError;
use crate::gateway;
use crate::invoke;
use crate::isolation::NamespaceIsolation;
use crate::loader::DelegateLoader;
use crate::readiness;
use crate::resources::{PodIdentity, ResourceMap, ResourceProvider};
use crate::runtime::{self, CmdArgs, K8sArgs};
use crate::selection;
use crate::status;
use crate::traversal;
use cluster_client::ClusterClientTrait;
use cni_client::{CniCommand, CniError, CniResult, PluginExecutor, VersionInfo};
use crds::{DEFAULT_NETWORK_ANNOTATION, NETWORK_STATUS_ANNOTATION, NetworkStatus};
use k8s_openapi::api::core::v1::Pod;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// CNI versions this plugin speaks
pub const SUPPORTED_VERSIONS: [&str; 4] = ["0.3.0", "0.3.1", "0.4.0", "1.0.0"];

/// Plugin type assumed when the configuration names none
pub const DEFAULT_PLUGIN_TYPE: &str = "multinet";

/// Reply to the VERSION command
pub fn version_info(cni_version: &str) -> VersionInfo {
    VersionInfo {
        cni_version: cni_version.to_string(),
        supported_versions: SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect(),
    }
}

/// Progress of one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Reading runtime arguments, the pod and its annotations, or the cache
    Resolving,
    Loading,
    Authorizing,
    /// Running the delegate at this chain index
    Invoking(usize),
    Committed,
    RollingBack,
    Failed,
}

impl Phase {
    /// Whether `next` may follow this phase
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        match (self, next) {
            (Idle, Resolving | Failed) => true,
            (Resolving, Loading | Invoking(_) | Committed | Failed) => true,
            (Loading, Loading | Authorizing | Invoking(_) | Committed | Failed) => true,
            (Authorizing, Loading | Failed) => true,
            (Invoking(_), Invoking(_) | Committed | RollingBack | Failed) => true,
            (RollingBack, Failed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Committed | Phase::Failed)
    }
}

/// Phase tracker for one command
#[derive(Debug, Clone)]
pub struct Execution {
    command: CniCommand,
    container_id: String,
    phase: Phase,
    history: Vec<Phase>,
}

impl Execution {
    pub fn new(command: CniCommand, container_id: &str) -> Self {
        Self {
            command,
            container_id: container_id.to_string(),
            phase: Phase::Idle,
            history: vec![Phase::Idle],
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Every phase entered so far, starting with `Idle`
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    pub fn advance(&mut self, next: Phase) {
        if !self.phase.can_advance_to(next) {
            warn!(
                "{} for container {}: unexpected transition {:?} -> {:?}",
                self.command, self.container_id, self.phase, next
            );
        }
        debug!(
            "{} for container {}: {:?} -> {:?}",
            self.command, self.container_id, self.phase, next
        );
        self.phase = next;
        self.history.push(next);
    }
}

/// Result of a successful ADD
#[derive(Debug, Clone)]
pub struct AddOutcome {
    /// The master delegate's result, returned to the runtime
    pub result: CniResult,
    /// One entry per attached delegate, in chain order
    pub statuses: Vec<NetworkStatus>,
    pub links: Vec<ChainLink>,
}

/// What is known about the pod a command runs for
#[derive(Debug, Clone)]
struct PodContext {
    k8s: K8sArgs,
    pod: Option<Pod>,
    system: bool,
}

impl PodContext {
    fn namespace(&self) -> &str {
        &self.k8s.pod_namespace
    }

    fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.pod.as_ref()?.metadata.annotations.as_ref()
    }

    fn identity(&self) -> PodIdentity {
        let mut identity = self.k8s.identity();
        if identity.uid.is_empty() {
            if let Some(uid) = self.pod.as_ref().and_then(|p| p.metadata.uid.clone()) {
                identity.uid = uid;
            }
        }
        identity
    }

    fn without_pod(&self) -> Self {
        Self {
            k8s: self.k8s.clone(),
            pod: None,
            system: self.system,
        }
    }

    /// Interface names recorded in the pod's network status, per network
    fn interface_hints(&self) -> HashMap<String, VecDeque<String>> {
        let mut hints: HashMap<String, VecDeque<String>> = HashMap::new();
        let Some(raw) = self.annotations().and_then(|a| a.get(NETWORK_STATUS_ANNOTATION)) else {
            return hints;
        };
        match crds::parse_network_status(raw) {
            Ok(statuses) => {
                for s in statuses.into_iter().filter(|s| !s.interface.is_empty()) {
                    hints.entry(s.name).or_default().push_back(s.interface);
                }
            }
            Err(e) => debug!("Ignoring unparsable network status: {}", e),
        }
        hints
    }
}

/// Delegate engine.
pub struct DelegateEngine {
    conf: NetConf,
    executor: Arc<dyn PluginExecutor>,
    cluster: Option<Arc<dyn ClusterClientTrait>>,
    resources: Arc<dyn ResourceProvider>,
    cache: DelegateCache,
    isolation: NamespaceIsolation,
    command_timeout: Option<Duration>,
}

impl fmt::Debug for DelegateEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateEngine")
            .field("conf", &self.conf)
            .field("cluster", &self.cluster.is_some())
            .field("cache", &self.cache)
            .field("isolation", &self.isolation)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl DelegateEngine {
    pub fn new(
        conf: NetConf,
        executor: Arc<dyn PluginExecutor>,
        resources: Arc<dyn ResourceProvider>,
    ) -> Self {
        let isolation = NamespaceIsolation::new(
            conf.namespace_isolation,
            conf.non_isolated_namespaces.clone(),
        );
        let cache = DelegateCache::new(&conf.cni_dir);
        let command_timeout = conf.command_timeout();
        Self {
            conf,
            executor,
            cluster: None,
            resources,
            cache,
            isolation,
            command_timeout,
        }
    }

    /// Use the Kubernetes API for pods and NetworkAttachmentDefinitions
    pub fn with_cluster(mut self, cluster: Arc<dyn ClusterClientTrait>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Bound ADD by `timeout`, overriding `commandTimeoutSeconds`
    ///
    /// A delegate still running when the deadline passes is abandoned and
    /// the delegates attached before it are detached.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    pub fn conf(&self) -> &NetConf {
        &self.conf
    }

    fn self_type(&self) -> &str {
        if self.conf.plugin_type.is_empty() {
            DEFAULT_PLUGIN_TYPE
        } else {
            &self.conf.plugin_type
        }
    }

    /// ADD: attach every delegate, rolling back on failure
    pub async fn cmd_add(&self, args: &CmdArgs) -> Result<AddOutcome, EngineError> {
        let mut exec = Execution::new(CniCommand::Add, &args.container_id);
        self.add_traced(&mut exec, args).await
    }

    /// DEL: detach every delegate, last first
    pub async fn cmd_del(&self, args: &CmdArgs) -> Result<(), EngineError> {
        let mut exec = Execution::new(CniCommand::Del, &args.container_id);
        self.del_traced(&mut exec, args).await
    }

    /// CHECK: verify every delegate, stopping at the first failure
    pub async fn cmd_check(&self, args: &CmdArgs) -> Result<(), EngineError> {
        let mut exec = Execution::new(CniCommand::Check, &args.container_id);
        self.check_traced(&mut exec, args).await
    }

    /// ADD, recording phases in `exec`
    pub async fn add_traced(
        &self,
        exec: &mut Execution,
        args: &CmdArgs,
    ) -> Result<AddOutcome, EngineError> {
        let outcome = self.add(exec, args).await;
        match &outcome {
            Ok(outcome) => info!(
                "ADD for container {} attached {} network(s)",
                args.container_id,
                outcome.links.len()
            ),
            Err(e) => {
                exec.advance(Phase::Failed);
                error!("ADD for container {} failed: {}", args.container_id, e);
            }
        }
        outcome
    }

    async fn add(&self, exec: &mut Execution, args: &CmdArgs) -> Result<AddOutcome, EngineError> {
        let deadline = self.command_timeout.map(|timeout| Instant::now() + timeout);
        exec.advance(Phase::Resolving);
        if let Some(path) = &self.conf.readiness_indicator_file {
            readiness::wait_for_indicator(
                path,
                self.conf.readiness_timeout(),
                readiness::POLL_INTERVAL,
            )
            .await?;
        }
        let k8s = K8sArgs::parse(&args.args)?;
        let ctx = self.pod_context(k8s, CniCommand::Add).await?;

        let mut delegates = self.build_chain(exec, &ctx).await?;
        let winner = gateway::apply_gateway_policy(&mut delegates);
        let mut links = link_chain(delegates, &args.ifname, HashMap::new())?;

        let attached = traversal::fail_fast(&links, |i, link| {
            exec.advance(Phase::Invoking(i));
            self.add_link_before(i, link, args, deadline)
        })
        .await;
        let results = match attached {
            Ok(results) => results,
            Err(halted) => {
                exec.advance(Phase::RollingBack);
                let failures = self
                    .rollback(&links[..halted.index], &halted.completed, args)
                    .await;
                return Err(with_rollback(halted.error, failures));
            }
        };

        for (link, result) in links.iter_mut().zip(&results) {
            link.result = Some(result.clone());
        }
        let statuses: Vec<NetworkStatus> = links
            .iter()
            .zip(&results)
            .enumerate()
            .map(|(i, (link, result))| {
                let is_default = winner.map_or(link.delegate.master_plugin, |w| w == i);
                status::network_status(&link.delegate, &link.ifname, result, is_default)
            })
            .collect();

        if let Err(e) = self.commit(&ctx, args, &links, &statuses).await {
            warn!(
                "Recording networks of container {} failed, detaching: {}",
                args.container_id, e
            );
            exec.advance(Phase::RollingBack);
            let failures = self.rollback(&links, &results, args).await;
            if let Err(e) = self.cache.remove(&args.container_id).await {
                warn!("Failed to remove delegate cache: {}", e);
            }
            return Err(with_rollback(e, failures));
        }
        exec.advance(Phase::Committed);

        // chains are never empty; the last delegate stands in for a missing master
        let master = links
            .iter()
            .position(|l| l.delegate.master_plugin)
            .unwrap_or(links.len() - 1);
        let mut result = results[master].clone();
        if !self.conf.cni_version.is_empty() {
            result.cni_version = self.conf.cni_version.clone();
        }
        Ok(AddOutcome {
            result,
            statuses,
            links,
        })
    }

    /// DEL, recording phases in `exec`
    pub async fn del_traced(&self, exec: &mut Execution, args: &CmdArgs) -> Result<(), EngineError> {
        exec.advance(Phase::Resolving);
        let k8s = K8sArgs::parse(&args.args).unwrap_or_else(|e| {
            warn!("Ignoring malformed CNI_ARGS on DEL: {}", e);
            K8sArgs::default()
        });

        let links = match self.cache.load(&args.container_id).await {
            Ok(Some(chain)) => {
                debug!(
                    "Using {} cached delegate(s) for container {}",
                    chain.links.len(),
                    args.container_id
                );
                chain.links
            }
            Ok(None) => self.rebuild_for_del(exec, &k8s, args).await,
            Err(e) => {
                warn!("Ignoring unreadable delegate cache: {}", e);
                self.rebuild_for_del(exec, &k8s, args).await
            }
        };

        let failures = traversal::best_effort_reverse(&links, |i, link| {
            exec.advance(Phase::Invoking(i));
            self.del_link(i, link, args, link.result.as_ref())
        })
        .await;

        self.clear_status(&k8s).await;

        if failures.is_empty() {
            if let Err(e) = self.cache.remove(&args.container_id).await {
                warn!("Failed to remove delegate cache: {}", e);
            }
            exec.advance(Phase::Committed);
            info!(
                "DEL for container {} detached {} network(s)",
                args.container_id,
                links.len()
            );
            return Ok(());
        }

        exec.advance(Phase::Failed);
        for (i, e) in &failures {
            error!("DEL of delegate {} for container {} failed: {}", i, args.container_id, e);
        }
        Err(EngineError::Delete(
            failures.into_iter().map(|(_, e)| e).collect(),
        ))
    }

    /// Resolve the chain again when nothing was cached
    ///
    /// DEL never fails on resolution: without the pod only the cluster
    /// network (or inline delegates) are detached, and with nothing
    /// resolvable there is nothing to detach.
    async fn rebuild_for_del(
        &self,
        exec: &mut Execution,
        k8s: &K8sArgs,
        args: &CmdArgs,
    ) -> Vec<ChainLink> {
        let ctx = match self.pod_context(k8s.clone(), CniCommand::Del).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("Pod lookup failed on DEL: {}", e);
                PodContext {
                    k8s: k8s.clone(),
                    pod: None,
                    system: self.conf.is_system_namespace(&k8s.pod_namespace),
                }
            }
        };
        let hints = ctx.interface_hints();

        let chain = match self.build_chain(exec, &ctx).await {
            Ok(chain) => chain,
            Err(e) if ctx.pod.is_some() => {
                warn!("Resolving pod networks on DEL failed, detaching defaults only: {}", e);
                match self.build_chain(exec, &ctx.without_pod()).await {
                    Ok(chain) => chain,
                    Err(e) => {
                        warn!("Nothing to detach for container {}: {}", args.container_id, e);
                        return Vec::new();
                    }
                }
            }
            Err(e) => {
                warn!("Nothing to detach for container {}: {}", args.container_id, e);
                return Vec::new();
            }
        };

        link_chain(chain, &args.ifname, hints).unwrap_or_else(|e| {
            warn!("Nothing to detach for container {}: {}", args.container_id, e);
            Vec::new()
        })
    }

    /// CHECK, recording phases in `exec`
    pub async fn check_traced(
        &self,
        exec: &mut Execution,
        args: &CmdArgs,
    ) -> Result<(), EngineError> {
        let outcome = self.check(exec, args).await;
        if let Err(e) = &outcome {
            exec.advance(Phase::Failed);
            error!("CHECK for container {} failed: {}", args.container_id, e);
        }
        outcome
    }

    async fn check(&self, exec: &mut Execution, args: &CmdArgs) -> Result<(), EngineError> {
        exec.advance(Phase::Resolving);
        if !invoke::supports_check(&self.conf.cni_version) {
            return Err(EngineError::Config(format!(
                "configuration version {:?} does not support CHECK",
                self.conf.cni_version
            )));
        }

        let links = match self.cache.load(&args.container_id).await? {
            Some(chain) => chain.links,
            None => {
                let k8s = K8sArgs::parse(&args.args)?;
                let ctx = self.pod_context(k8s, CniCommand::Check).await?;
                let mut chain = self.build_chain(exec, &ctx).await?;
                gateway::apply_gateway_policy(&mut chain);
                link_chain(chain, &args.ifname, ctx.interface_hints())?
            }
        };

        traversal::fail_fast(&links, |i, link| {
            exec.advance(Phase::Invoking(i));
            self.check_link(i, link, args)
        })
        .await
        .map_err(|halted| halted.error)?;

        exec.advance(Phase::Committed);
        debug!("CHECK for container {} passed", args.container_id);
        Ok(())
    }

    async fn pod_context(&self, k8s: K8sArgs, command: CniCommand) -> Result<PodContext, EngineError> {
        let system = self.conf.is_system_namespace(&k8s.pod_namespace);
        let mut pod = None;
        if let (Some(cluster), true) = (&self.cluster, k8s.has_pod()) {
            match cluster.get_pod(&k8s.pod_namespace, &k8s.pod_name).await {
                Ok(found) => pod = Some(found),
                Err(e) if command == CniCommand::Del => {
                    warn!(
                        "Pod {}/{} unavailable on DEL: {}",
                        k8s.pod_namespace, k8s.pod_name, e
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        let reported_uid = pod
            .as_ref()
            .and_then(|p: &Pod| p.metadata.uid.as_deref())
            .unwrap_or_default()
            .to_string();
        if !k8s.pod_uid.is_empty() && !reported_uid.is_empty() && reported_uid != k8s.pod_uid {
            if command != CniCommand::Del {
                return Err(EngineError::Config(format!(
                    "pod {}/{} has UID {} but the runtime expects {}",
                    k8s.pod_namespace, k8s.pod_name, reported_uid, k8s.pod_uid
                )));
            }
            warn!(
                "Pod {}/{} was replaced (UID {} != {}), ignoring its networks",
                k8s.pod_namespace, k8s.pod_name, reported_uid, k8s.pod_uid
            );
            pod = None;
        }

        Ok(PodContext { k8s, pod, system })
    }

    /// Cluster network for the pod: the configured one, unless the pod
    /// overrides it outside the system namespaces
    fn cluster_network(&self, ctx: &PodContext) -> Result<Option<String>, EngineError> {
        let Some(configured) = &self.conf.cluster_network else {
            return Ok(None);
        };
        if ctx.system {
            return Ok(Some(configured.clone()));
        }
        let Some(raw) = ctx
            .annotations()
            .and_then(|a| a.get(DEFAULT_NETWORK_ANNOTATION))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
        else {
            return Ok(Some(configured.clone()));
        };

        match selection::resolve(raw, &self.conf.multus_namespace)?.as_slice() {
            [one] => {
                info!(
                    "Pod {}/{} overrides the cluster network with {}/{}",
                    ctx.k8s.pod_namespace, ctx.k8s.pod_name, one.namespace, one.name
                );
                Ok(Some(format!("{}/{}", one.namespace, one.name)))
            }
            _ => Err(EngineError::Parse(format!(
                "{DEFAULT_NETWORK_ANNOTATION} must name exactly one network"
            ))),
        }
    }

    async fn build_chain(
        &self,
        exec: &mut Execution,
        ctx: &PodContext,
    ) -> Result<Vec<DelegateConfig>, EngineError> {
        let selections = match selection::networks_annotation(ctx.annotations()) {
            Some(raw) => selection::resolve(raw, ctx.namespace())?,
            None => Vec::new(),
        };
        let cluster_network = self.cluster_network(ctx)?;

        exec.advance(Phase::Loading);
        let loader = DelegateLoader::new(
            self.cluster.as_deref(),
            self.resources.as_ref(),
            &self.conf.conf_dir,
            self.self_type(),
        );
        let pod = ctx.identity();
        let mut resources = ResourceMap::pending();
        let mut chain = Vec::with_capacity(selections.len() + 1);

        match cluster_network {
            Some(reference) => {
                let namespace = &self.conf.multus_namespace;
                let (mut master, next) = loader
                    .load_reference(&reference, namespace, &pod, resources)
                    .await?;
                resources = next;
                master.master_plugin = true;
                chain.push(master);

                if !ctx.system {
                    for reference in &self.conf.default_networks {
                        let (delegate, next) = loader
                            .load_reference(reference, namespace, &pod, resources)
                            .await?;
                        resources = next;
                        chain.push(delegate);
                    }
                }
            }
            None => chain.extend(self.conf.delegates.iter().cloned()),
        }

        for selection in &selections {
            exec.advance(Phase::Authorizing);
            self.isolation.check(ctx.namespace(), &selection.namespace)?;
            exec.advance(Phase::Loading);
            let (delegate, next) = loader.load(selection, &pod, resources).await?;
            resources = next;
            chain.push(delegate);
        }

        if chain.is_empty() {
            return Err(EngineError::Config("no delegates to invoke".to_string()));
        }
        Ok(chain)
    }

    async fn add_link(
        &self,
        index: usize,
        link: &ChainLink,
        args: &CmdArgs,
    ) -> Result<CniResult, EngineError> {
        let delegate = &link.delegate;
        let env = args.delegate_env(&link.ifname)?;
        let caps = runtime::capability_args(delegate, self.conf.runtime_config.as_ref())?;
        let mut result = invoke::add(self.executor.as_ref(), &delegate.conf, &env, &caps)
            .await
            .map_err(|source| invocation_error(index, link, CniCommand::Add, source))?;
        delegate.route_policy.apply(&mut result);
        info!(
            "Attached network {} (type {}) as {} in container {}",
            delegate.name,
            delegate.plugin_type(),
            link.ifname,
            args.container_id
        );
        Ok(result)
    }

    /// `add_link`, abandoned once `deadline` passes
    async fn add_link_before(
        &self,
        index: usize,
        link: &ChainLink,
        args: &CmdArgs,
        deadline: Option<Instant>,
    ) -> Result<CniResult, EngineError> {
        let (Some(deadline), Some(timeout)) = (deadline, self.command_timeout) else {
            return self.add_link(index, link, args).await;
        };
        match tokio::time::timeout_at(deadline, self.add_link(index, link, args)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                warn!(
                    "Delegate {} ({}) for container {} still running at the command deadline",
                    index, link.delegate.name, args.container_id
                );
                Err(EngineError::DeadlineExceeded {
                    index,
                    network: link.delegate.name.clone(),
                    command: CniCommand::Add,
                    timeout,
                })
            }
        }
    }

    async fn del_link(
        &self,
        index: usize,
        link: &ChainLink,
        args: &CmdArgs,
        prev_result: Option<&CniResult>,
    ) -> Result<(), EngineError> {
        let delegate = &link.delegate;
        let env = args.delegate_env(&link.ifname)?;
        let caps = runtime::capability_args(delegate, self.conf.runtime_config.as_ref())?;
        invoke::del(self.executor.as_ref(), &delegate.conf, &env, &caps, prev_result)
            .await
            .map_err(|source| invocation_error(index, link, CniCommand::Del, source))?;
        debug!(
            "Detached network {} ({}) from container {}",
            delegate.name, link.ifname, args.container_id
        );
        Ok(())
    }

    async fn check_link(
        &self,
        index: usize,
        link: &ChainLink,
        args: &CmdArgs,
    ) -> Result<(), EngineError> {
        let delegate = &link.delegate;
        let env = args.delegate_env(&link.ifname)?;
        let caps = runtime::capability_args(delegate, self.conf.runtime_config.as_ref())?;
        invoke::check(
            self.executor.as_ref(),
            &delegate.conf,
            &env,
            &caps,
            link.result.as_ref(),
        )
        .await
        .map_err(|source| invocation_error(index, link, CniCommand::Check, source))
    }

    /// Detach `links` last first, returning the failures
    async fn rollback(
        &self,
        links: &[ChainLink],
        results: &[CniResult],
        args: &CmdArgs,
    ) -> Vec<EngineError> {
        traversal::best_effort_reverse(links, |i, link| {
            self.del_link(i, link, args, results.get(i))
        })
        .await
        .into_iter()
        .map(|(i, e)| {
            warn!("Rollback of delegate {} for container {} failed: {}", i, args.container_id, e);
            e
        })
        .collect()
    }

    async fn commit(
        &self,
        ctx: &PodContext,
        args: &CmdArgs,
        links: &[ChainLink],
        statuses: &[NetworkStatus],
    ) -> Result<(), EngineError> {
        self.cache
            .save(&CachedChain {
                container_id: args.container_id.clone(),
                links: links.to_vec(),
            })
            .await?;

        let (Some(cluster), Some(_)) = (&self.cluster, &ctx.pod) else {
            return Ok(());
        };
        if ctx.system {
            debug!("Not publishing network status in system namespace {}", ctx.namespace());
            return Ok(());
        }
        let value = crds::format_network_status(statuses)?;
        cluster
            .set_pod_annotation(
                &ctx.k8s.pod_namespace,
                &ctx.k8s.pod_name,
                NETWORK_STATUS_ANNOTATION,
                Some(&value),
            )
            .await?;
        info!(
            "Published status of {} network(s) on pod {}/{}",
            statuses.len(),
            ctx.k8s.pod_namespace,
            ctx.k8s.pod_name
        );
        Ok(())
    }

    /// Reset the pod's network status after DEL; failures are only logged
    async fn clear_status(&self, k8s: &K8sArgs) {
        let Some(cluster) = &self.cluster else {
            return;
        };
        if !k8s.has_pod() || self.conf.is_system_namespace(&k8s.pod_namespace) {
            return;
        }
        let pod = match cluster.get_pod(&k8s.pod_namespace, &k8s.pod_name).await {
            Ok(pod) => pod,
            Err(e) => {
                debug!("Not clearing network status: {}", e);
                return;
            }
        };
        let uid = pod.metadata.uid.as_deref().unwrap_or_default();
        if !k8s.pod_uid.is_empty() && uid != k8s.pod_uid {
            debug!("Not clearing network status of replaced pod {}/{}", k8s.pod_namespace, k8s.pod_name);
            return;
        }
        if let Err(e) = cluster
            .set_pod_annotation(
                &k8s.pod_namespace,
                &k8s.pod_name,
                NETWORK_STATUS_ANNOTATION,
                Some("[]"),
            )
            .await
        {
            warn!(
                "Failed to clear network status of pod {}/{}: {}",
                k8s.pod_namespace, k8s.pod_name, e
            );
        }
    }
}

/// Assign interface names and reject duplicates
///
/// The master delegate gets the runtime's interface; others get their
/// request, the name recorded for their network, or `net<index>`.
fn link_chain(
    delegates: Vec<DelegateConfig>,
    runtime_ifname: &str,
    mut hints: HashMap<String, VecDeque<String>>,
) -> Result<Vec<ChainLink>, EngineError> {
    let mut seen = HashSet::new();
    delegates
        .into_iter()
        .enumerate()
        .map(|(i, delegate)| {
            let ifname = if delegate.master_plugin {
                runtime_ifname.to_string()
            } else if let Some(requested) = &delegate.ifname_request {
                requested.clone()
            } else if let Some(recorded) =
                hints.get_mut(&delegate.name).and_then(VecDeque::pop_front)
            {
                recorded
            } else {
                format!("net{i}")
            };
            if !seen.insert(ifname.clone()) {
                return Err(EngineError::Parse(format!(
                    "interface name {ifname} is used by more than one network"
                )));
            }
            Ok(ChainLink::new(delegate, ifname))
        })
        .collect()
}

fn invocation_error(
    index: usize,
    link: &ChainLink,
    command: CniCommand,
    source: CniError,
) -> EngineError {
    EngineError::Invocation {
        index,
        network: link.delegate.name.clone(),
        plugin: link.delegate.plugin_type().to_string(),
        command,
        source,
    }
}

fn with_rollback(primary: EngineError, failures: Vec<EngineError>) -> EngineError {
    if failures.is_empty() {
        primary
    } else {
        EngineError::Rollback {
            primary: Box::new(primary),
            failures,
        }
    }
}
