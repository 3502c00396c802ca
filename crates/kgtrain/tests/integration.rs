//! End-to-end tests over on-disk datasets.

use std::fs;
use std::path::Path;

use kgtrain::classification;
use kgtrain::evaluation::{self, LinkPredictor};
use kgtrain::{
    BatchBuilder, BatchConfig, BiasMode, Error, GraphStore, KgConfig, NegativeFilter,
    NegativeSampler, ParameterStore, SamplerConfig, Scorer, Split, Trainer, TransE, Triple,
};

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn split_file(triples: &[(u32, u32, u32)]) -> String {
    let mut out = format!("{}\n", triples.len());
    for (h, t, r) in triples {
        out.push_str(&format!("{h} {t} {r}\n"));
    }
    out
}

/// Two relations over 10 entities: `next` (i -> i+1) and `skip` (i -> i+2).
fn dataset() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let mut train = Vec::new();
    for i in 0..8 {
        train.push((i, i + 1, 0));
        train.push((i, i + 2, 1));
    }
    write(dir.path(), "train2id.txt", &split_file(&train));
    write(dir.path(), "valid2id.txt", &split_file(&[(8, 9, 0), (7, 9, 1)]));
    write(dir.path(), "test2id.txt", &split_file(&[(2, 3, 0), (3, 5, 1)]));
    write(dir.path(), "entity2id.txt", "10\n");
    write(dir.path(), "relation2id.txt", "2\n");
    write(
        dir.path(),
        "type_constrain.txt",
        "2\n0 9 0 1 2 3 4 5 6 7 8\n0 9 1 2 3 4 5 6 7 8 9\n1 8 0 1 2 3 4 5 6 7\n1 8 2 3 4 5 6 7 8 9\n",
    );
    dir
}

#[test]
fn test_full_pipeline() {
    let dir = dataset();
    let store = GraphStore::from_dir(dir.path()).unwrap();
    assert_eq!(store.entity_count(), 10);
    assert_eq!(store.relation_count(), 2);
    assert!(store.type_constraints().is_some());

    let config = KgConfig::default()
        .with_in_path(dir.path())
        .with_bias(BiasMode::Bern)
        .with_nbatches(4)
        .with_ent_neg_rate(2)
        .with_work_threads(2)
        .with_dimension(16)
        .with_alpha(0.05)
        .with_opt_method(kgtrain::OptimizerKind::Adagrad)
        .with_train_times(30);

    let mut trainer = Trainer::new(&store, &config).unwrap();
    let summary = trainer.run(&store, |_| {}).unwrap();
    assert_eq!(summary.epochs.len(), 30);
    let first = summary.epochs[0].loss;
    let last = summary.final_loss().unwrap();
    assert!(last < first, "loss did not decrease: {first} -> {last}");

    let model = trainer.into_model();
    let report = evaluation::evaluate(&store, Split::Test, &model).unwrap();
    assert_eq!(report.head.raw.num_triples, 2);
    assert!(report.average.constrained.is_some());
    // Filtering can only remove candidates ahead of the true entity.
    assert!(report.average.filtered.mr <= report.average.raw.mr);
    assert!(report.average.raw.mr >= 1.0 && report.average.raw.mr <= 10.0);

    let (table, accuracy) = classification::run(&store, &model, 7).unwrap();
    assert_eq!(table.relation_count(), 2);
    assert_eq!(accuracy.total(), 4);
    assert!((0.0..=1.0).contains(&accuracy.accuracy));
}

#[test]
fn test_tail_only_sampling_never_rebuilds_positive() {
    // 4 entities, 1 relation, train = {(0,1,0), (1,2,0)}
    let store = GraphStore::new(
        4,
        1,
        vec![Triple::new(0, 1, 0), Triple::new(1, 2, 0)],
        vec![],
        vec![],
    )
    .unwrap();
    let mut sampler = NegativeSampler::new(
        1,
        SamplerConfig {
            filter: NegativeFilter::Train,
            max_retries: 32,
        },
    );
    let positive = Triple::new(0, 1, 0);

    let mut tails = [0usize; 4];
    for _ in 0..400 {
        let negs = sampler.sample(&store, positive, 1, 0, 1.0);
        let neg = negs[0];
        assert_ne!(neg, positive);
        assert_eq!((neg.head, neg.relation), (0, 0));
        tails[neg.tail as usize] += 1;
    }
    // (0,2,0) is not a training triple, so it is a valid negative.
    assert!(tails[2] > 0);
    assert_eq!(tails[1], 0);
    assert!(tails[0] > 0 && tails[3] > 0);
}

#[test]
fn test_ranking_with_perfect_scorer() {
    // A unique correct head for (tail = 5, relation = 0).
    let train: Vec<Triple> = (0..4).map(|i| Triple::new(i, i + 6, 0)).collect();
    let test = vec![Triple::new(2, 5, 0)];
    let store = GraphStore::new(10, 1, train, vec![], test).unwrap();

    let scorer = |t: Triple| if t == Triple::new(2, 5, 0) { 0.0f32 } else { 1.0 };

    let report = evaluation::evaluate(&store, Split::Test, &scorer).unwrap();
    for metrics in [report.head, report.tail, report.average] {
        assert_eq!(metrics.raw.mr, 1.0);
        assert_eq!(metrics.filtered.mr, 1.0);
        assert_eq!(metrics.filtered.hits_at_1, 1.0);
    }

    // The stepwise protocol gives the same result.
    let mut lp = LinkPredictor::new(&store, Split::Test).unwrap();
    let scores = scorer.score_columns(lp.next_head_batch(0).unwrap());
    lp.report_head_scores(&scores).unwrap();
    let scores = scorer.score_columns(lp.next_tail_batch(0).unwrap());
    lp.report_tail_scores(&scores).unwrap();
    assert_eq!(lp.finish().unwrap(), report);
}

#[test]
fn test_constant_scorer_is_ranked_last() {
    let store = GraphStore::new(
        6,
        1,
        vec![Triple::new(0, 1, 0)],
        vec![],
        vec![Triple::new(2, 3, 0)],
    )
    .unwrap();
    let scorer = |_: Triple| 1.0f32;
    let report = evaluation::evaluate(&store, Split::Test, &scorer).unwrap();
    // Every tie counts against the true entity.
    assert_eq!(report.head.raw.mr, 6.0);
    assert_eq!(report.tail.raw.mr, 6.0);
}

#[test]
fn test_export_import_preserves_probe_scores() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transe.json");

    let model = TransE::new(12, 3, 10, 5);
    model.to_parameters().save(&path).unwrap();
    let restored = TransE::from_parameters(&ParameterStore::load(&path).unwrap()).unwrap();

    let probe: Vec<Triple> = (0..12)
        .map(|i| Triple::new(i, (i * 7) % 12, i % 3))
        .collect();
    for t in probe {
        assert_eq!(model.score(t), restored.score(t));
    }
}

#[test]
fn test_bern_bias_follows_relation_shape() {
    // Relation 0: one head with many tails. Relation 1: many heads, one tail.
    let mut train: Vec<Triple> = (1..6).map(|t| Triple::new(0, t, 0)).collect();
    train.extend((1..6).map(|h| Triple::new(h, 0, 1)));
    let store = GraphStore::new(6, 2, train, vec![], vec![]).unwrap();

    // Replacing the tail of a 1-to-N relation is likely to hit a true fact.
    assert!(store.corruption_bias(0, BiasMode::Bern) < 0.5);
    assert!(store.corruption_bias(1, BiasMode::Bern) > 0.5);
    assert_eq!(store.corruption_bias(0, BiasMode::Uniform), 0.5);
}

#[test]
fn test_batches_are_reproducible_across_builders() {
    let dir = dataset();
    let store = GraphStore::from_dir(dir.path()).unwrap();
    let config = BatchConfig {
        batch_size: 6,
        negative_entities: 2,
        negative_relations: 1,
        workers: 3,
        seed: 1234,
        ..BatchConfig::default()
    };
    let mut a = BatchBuilder::new(&store, config).unwrap();
    let mut b = BatchBuilder::new(&store, config).unwrap();
    for _ in 0..10 {
        let x = a.next_batch(&store);
        let (h, t, r) = (x.heads().to_vec(), x.tails().to_vec(), x.relations().to_vec());
        let y = b.next_batch(&store);
        assert_eq!(h, y.heads());
        assert_eq!(t, y.tails());
        assert_eq!(r, y.relations());
    }
}

#[test]
fn test_malformed_dataset_is_rejected() {
    let dir = dataset();
    write(dir.path(), "test2id.txt", "2\n2 3 0\n3 11 1\n");
    let err = GraphStore::from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, Error::IdOutOfRange { line: 3, .. }), "{err}");

    write(dir.path(), "test2id.txt", "1\n2 3\n");
    let err = GraphStore::from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, Error::DataFormat { line: 2, .. }), "{err}");

    fs::remove_file(dir.path().join("valid2id.txt")).unwrap();
    assert!(matches!(
        GraphStore::from_dir(dir.path()),
        Err(Error::DataFormat { .. })
    ));
}

#[test]
fn test_config_file_drives_a_run() {
    let dir = dataset();
    let config_path = dir.path().join("run.toml");
    fs::write(
        &config_path,
        format!(
            "[data]\nin_path = {:?}\n\n[sampling]\nnbatches = 2\n\n[training]\ndimension = 4\ntrain_times = 2\n",
            dir.path().display().to_string()
        ),
    )
    .unwrap();

    let config = KgConfig::from_file(&config_path).unwrap();
    let store = GraphStore::from_dir(&config.data.in_path).unwrap();
    let mut trainer = Trainer::new(&store, &config).unwrap();
    let summary = trainer.run(&store, |_| {}).unwrap();
    assert_eq!(summary.epochs.len(), 2);
    assert_eq!(trainer.model().dim(), 4);
}

#[test]
fn test_partial_type_constraints_leave_other_relations_unconstrained() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "train2id.txt", &split_file(&[(0, 1, 0), (1, 2, 1)]));
    write(dir.path(), "valid2id.txt", "0\n");
    write(dir.path(), "test2id.txt", &split_file(&[(2, 3, 1)]));
    write(dir.path(), "entity2id.txt", "5\n");
    // Lists for relation 0 only.
    write(dir.path(), "type_constrain.txt", "1\n0 2 0 1\n0 2 1 2\n");
    let store = GraphStore::from_dir(dir.path()).unwrap();

    let scorer = |_: Triple| 1.0f32;
    let report = evaluation::evaluate(&store, Split::Test, &scorer).unwrap();
    let constrained = report.average.constrained.unwrap();
    assert_eq!(report.average.filtered.mr, 5.0);
    assert_eq!(constrained.mr, 5.0);
    assert_eq!(constrained.hits_at_1, 0.0);
}
