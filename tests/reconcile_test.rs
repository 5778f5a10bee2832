use std::env;
use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use tagvisor::{
    client::memory::Operation,
    config::{GovernorConfig, ReconcilerConfig},
    governor::ThrottleCodes,
    reconcile::cluster_tags,
    Error, GovernorOptions, MemoryTagStore, Reconciler, ResourceRef, TagSet,
};
use tokio::time::Instant;

lazy_static! {
    pub static ref CLUSTER_NAME: String =
        env::var("TAGVISOR_CLUSTER").unwrap_or("prod".to_string());
    pub static ref CLUSTER_ARN: ResourceRef = ResourceRef::new(format!(
        "arn:aws:eks:us-west-2:123456789012:cluster/{}",
        *CLUSTER_NAME
    ));
    pub static ref NODEGROUP_ARN: ResourceRef = ResourceRef::new(format!(
        "arn:aws:eks:us-west-2:123456789012:nodegroup/{}/workers",
        *CLUSTER_NAME
    ));
    pub static ref GOVERNOR_CONFIG: GovernorConfig = GovernorConfig {
        capacity: 10.0,
        refill_rate: 2.0,
        acquire_timeout_ms: None,
        throttle_codes: None,
    };
}

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn reconciler(
    store: &Arc<MemoryTagStore>,
    config: &GovernorConfig,
) -> Reconciler<Arc<MemoryTagStore>> {
    let governor = GovernorOptions::from_config(config.clone())
        .validate()
        .expect("Fail to validate governor options")
        .build()
        .expect("Fail to build governor");
    Reconciler::new(Arc::clone(store), governor)
}

#[tokio::test(start_paused = true)]
async fn test_second_pass_issues_no_writes() {
    init();
    let store = Arc::new(MemoryTagStore::new());
    store.insert(
        CLUSTER_ARN.clone(),
        TagSet::new().with("a", "1").with("b", "2"),
    );
    let r = reconciler(&store, &GOVERNOR_CONFIG);
    let desired = TagSet::new().with("b", "3").with("c", "4");

    let first = r.reconcile(&CLUSTER_ARN, &desired).await.unwrap();
    assert_eq!((first.upserted, first.removed), (2, 1));
    assert_eq!(store.tags(&CLUSTER_ARN).unwrap(), desired);

    let (reads, writes) = (store.reads(), store.writes());
    let second = r.reconcile(&CLUSTER_ARN, &desired).await.unwrap();
    assert!(second.is_noop());
    assert_eq!(store.reads(), reads + 1);
    assert_eq!(store.writes(), writes);
}

#[tokio::test(start_paused = true)]
async fn test_throttled_write_slows_down_next_pass() {
    init();
    let store = Arc::new(MemoryTagStore::new());
    store.insert(CLUSTER_ARN.clone(), TagSet::new());
    store.fail_next(
        Operation::AddOrUpdate,
        ThrottleCodes::default().classify("Throttling", "Rate exceeded"),
    );
    let r = reconciler(&store, &GOVERNOR_CONFIG);
    let desired = TagSet::new().with("owner", "infra");

    let res = r.reconcile(&CLUSTER_ARN, &desired).await;
    assert!(matches!(res, Err(Error::Throttle(_))));
    assert_eq!(r.governor().limiter().tokens(), 0.0);

    // read and write each wait half a second at 2 tokens/s
    let start = Instant::now();
    r.reconcile(&CLUSTER_ARN, &desired).await.unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(1), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1100), "elapsed {elapsed:?}");
    assert_eq!(store.tags(&CLUSTER_ARN).unwrap(), desired);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_code_in_transport_error() {
    init();
    let store = Arc::new(MemoryTagStore::new());
    store.insert(CLUSTER_ARN.clone(), TagSet::new());
    store.fail_next(
        Operation::Read,
        Error::Transport("RequestLimitExceeded: slow down".into()),
    );
    let r = reconciler(&store, &GOVERNOR_CONFIG);

    let res = r
        .reconcile(&CLUSTER_ARN, &TagSet::new().with("a", "1"))
        .await;
    assert!(matches!(res, Err(Error::Transport(_))));
    assert_eq!(r.governor().limiter().tokens(), 0.0);
    assert_eq!(store.writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_parallel_acquire_drains_exactly() {
    init();
    const N: usize = 16;
    let limiter = Arc::new(tagvisor::Limiter::new(N as f64, 0.0).unwrap());
    let token = tokio_util::sync::CancellationToken::new();

    // N + 1 contenders for N tokens, all started together
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..=N {
        let limiter = Arc::clone(&limiter);
        let token = token.clone();
        tasks.spawn(async move { limiter.acquire_with_cancel(1, &token).await });
    }

    let mut granted = 0;
    for _ in 0..N {
        let res = tasks.join_next().await.unwrap().unwrap();
        assert!(res.is_ok(), "unexpected {res:?}");
        granted += 1;
    }
    assert_eq!(granted, N);
    assert_eq!(limiter.tokens(), 0.0);

    // the last one is still waiting, however long we wait
    let pending = tokio::time::timeout(Duration::from_secs(60), tasks.join_next()).await;
    assert!(pending.is_err());
    assert_eq!(tasks.len(), 1);

    token.cancel();
    let res = tasks.join_next().await.unwrap().unwrap();
    assert!(matches!(res, Err(Error::Cancelled)));
    assert_eq!(limiter.tokens(), 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_partial_failure_then_rerun_converges() {
    init();
    let store = Arc::new(MemoryTagStore::new());
    store.insert(
        NODEGROUP_ARN.clone(),
        TagSet::new().with("stale", "1").with("keep", "x"),
    );
    store.fail_next(
        Operation::Remove,
        Error::Transport("AccessDeniedException: not allowed".into()),
    );
    let r = reconciler(&store, &GOVERNOR_CONFIG);
    let desired = TagSet::new().with("keep", "y");

    assert!(r.reconcile(&NODEGROUP_ARN, &desired).await.is_err());
    // a plain failure leaves the budget alone
    assert_eq!(r.governor().limiter().tokens(), 7.0);

    let outcome = r.reconcile(&NODEGROUP_ARN, &desired).await.unwrap();
    assert_eq!((outcome.upserted, outcome.removed), (0, 1));
    assert_eq!(store.tags(&NODEGROUP_ARN).unwrap(), desired);
    assert!(r.reconcile(&NODEGROUP_ARN, &desired).await.unwrap().is_noop());
}

#[tokio::test(start_paused = true)]
async fn test_reconcile_from_config_file() {
    init();
    let path = env::temp_dir().join("tagvisor_reconcile_test_config.json");
    let config = format!(
        r#"{{
            "cluster_name": "{}",
            "kubernetes_cluster_name": "{}-eks",
            "additional_tags": {{ "team": "infra" }},
            "governor": {{ "capacity": 4, "refill_rate": 1, "acquire_timeout_ms": 10000 }}
        }}"#,
        *CLUSTER_NAME, *CLUSTER_NAME
    );
    std::fs::write(&path, config).expect("Fail to write config");
    let config = ReconcilerConfig::from_file(&path).expect("Fail to read config");
    let scope = config.scope();

    let store = Arc::new(MemoryTagStore::new());
    store.insert(CLUSTER_ARN.clone(), TagSet::new().with("team", "legacy"));
    store.insert(NODEGROUP_ARN.clone(), TagSet::new());
    let r = reconciler(&store, &config.governor);

    r.reconcile_cluster(&scope, &CLUSTER_ARN).await.unwrap();
    let tags = store.tags(&CLUSTER_ARN).unwrap();
    assert_eq!(tags, cluster_tags(&scope, &CLUSTER_ARN));
    assert_eq!(tags.get("team").unwrap(), "infra");
    assert_eq!(
        tags.get("Name").unwrap(),
        &format!("{}-eks", *CLUSTER_NAME)
    );
    assert_eq!(
        tags.get("sigs.k8s.io/cluster-api-provider-aws/role").unwrap(),
        "common"
    );

    r.reconcile_nodegroup(&scope, &NODEGROUP_ARN).await.unwrap();
    let tags = store.tags(&NODEGROUP_ARN).unwrap();
    assert_eq!(
        tags.get(&format!("kubernetes.io/cluster/{}", *CLUSTER_NAME))
            .unwrap(),
        "owned"
    );
    assert_eq!(tags.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_batch_shares_rate_budget() {
    init();
    let store = Arc::new(MemoryTagStore::new());
    let mut items = Vec::new();
    for i in 0..4 {
        let resource = ResourceRef::new(format!("arn:aws:ec2:us-west-2:1:subnet/subnet-{i}"));
        store.insert(resource.clone(), TagSet::new());
        items.push((resource, TagSet::new().with("index", i.to_string())));
    }
    let config = GovernorConfig {
        capacity: 2.0,
        refill_rate: 1.0,
        ..Default::default()
    };
    let r = reconciler(&store, &config);

    // 4 reads and 4 writes against 2 tokens up front and 1 per second
    let start = Instant::now();
    let results = r.reconcile_batch(items.clone()).await;
    assert!(start.elapsed() >= Duration::from_secs(6));

    assert_eq!(results.len(), 4);
    for (resource, res) in &results {
        assert_eq!(res.as_ref().unwrap().upserted, 1, "{resource}");
    }
    for (resource, desired) in &items {
        assert_eq!(&store.tags(resource).unwrap(), desired);
    }
    assert_eq!((store.reads(), store.adds(), store.removes()), (4, 4, 0));
}

#[test]
fn test_blocking_acquire_from_threads() {
    init();
    let limiter = Arc::new(tagvisor::Limiter::new(4.0, 0.0).unwrap());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            std::thread::spawn(move || limiter.acquire_blocking(1, None))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    let res = limiter.acquire_blocking(1, Some(Duration::from_millis(120)));
    assert!(matches!(res, Err(Error::Timeout(_))));
}
