//! Reserved label, annotation, finalizer and taint keys.

/// Label on pods carrying the Slurm JobId of the pod's placeholder job.
pub const LABEL_PLACEHOLDER_JOB_ID: &str = "scheduler.slinky.slurm.net/slurm-jobid";

/// Label on nodes carrying the Slurm NodeName which corresponds to the
/// labeled Kubernetes node. Absent label means the names are identical.
pub const LABEL_SLURM_NODE_NAME: &str = "slinky.slurm.net/slurm-nodename";

/// Annotation on pods carrying the Slurm node chosen for the pod's
/// placeholder job.
pub const ANNOTATION_PLACEHOLDER_NODE: &str = "slinky.slurm.net/slurm-node";

/// Finalizer held while a pod is managed, so pod deletion events can still
/// read the placeholder job-id label during cleanup.
pub const FINALIZER_SCHEDULER: &str = "scheduler.slurm.net/finalizer";

// Annotations mapping to Slurm placeholder job attributes. Set on the
// root workload object, merged into the job IR.
pub const ANNOTATION_ACCOUNT: &str = "slinky.slurm.net/account";
pub const ANNOTATION_CONSTRAINTS: &str = "slinky.slurm.net/constraints";
pub const ANNOTATION_CPU_PER_TASK: &str = "slinky.slurm.net/cpu-per-task";
pub const ANNOTATION_GROUP_ID: &str = "slinky.slurm.net/group-id";
pub const ANNOTATION_JOB_NAME: &str = "slinky.slurm.net/job-name";
pub const ANNOTATION_LICENSES: &str = "slinky.slurm.net/licenses";
pub const ANNOTATION_MAX_NODES: &str = "slinky.slurm.net/max-nodes";
pub const ANNOTATION_MEM_PER_NODE: &str = "slinky.slurm.net/mem-per-node";
pub const ANNOTATION_MIN_NODES: &str = "slinky.slurm.net/min-nodes";
pub const ANNOTATION_PARTITION: &str = "slinky.slurm.net/partition";
pub const ANNOTATION_QOS: &str = "slinky.slurm.net/qos";
pub const ANNOTATION_RESERVATION: &str = "slinky.slurm.net/reservation";
pub const ANNOTATION_TIME_LIMIT: &str = "slinky.slurm.net/timelimit";
pub const ANNOTATION_USER_ID: &str = "slinky.slurm.net/user-id";
pub const ANNOTATION_WCKEY: &str = "slinky.slurm.net/wckey";

/// Taint applied to nodes visible to both schedulers. Value is the
/// configured scheduler name, effect NoExecute.
pub const TAINT_KEY_BRIDGED_NODE: &str = "slinky.slurm.net/managed-node";

/// The scheduler name Kubernetes assigns when none is requested.
pub const DEFAULT_SCHEDULER_NAME: &str = "default-scheduler";

/// Label associating pods with a PodGroup (co-scheduling convention).
pub const LABEL_POD_GROUP: &str = "scheduling.x-k8s.io/pod-group";

/// Label naming the child Job a JobSet pod belongs to.
pub const LABEL_JOB_NAME: &str = "job-name";

// LeaderWorkerSet labels used to collect the pods of one replica group.
pub const LABEL_LWS_NAME: &str = "leaderworkerset.sigs.k8s.io/name";
pub const LABEL_LWS_GROUP_INDEX: &str = "leaderworkerset.sigs.k8s.io/group-index";
pub const LABEL_LWS_GROUP_KEY: &str = "leaderworkerset.sigs.k8s.io/group-key";

/// Prefix marking Slurm node DRAIN reasons authored by this system.
/// Foreign drain reasons are never overridden.
pub const NODE_REASON_PREFIX: &str = "slurm-bridge:";
