//! In-memory triple store and dataset file formats.
//!
//! # File Formats
//!
//! Every split file starts with a line holding the number of triples, followed
//! by one whitespace-separated `head tail relation` triple per line:
//!
//! ```text
//! 2
//! 0 1 0
//! 1 2 0
//! ```
//!
//! `entity2id.txt` and `relation2id.txt` only contribute their first line (the
//! total). `type_constrain.txt` starts with the relation count, then holds two
//! lines per relation, `rel n id_1 .. id_n`: allowed heads first, then allowed
//! tails.
//!
//! # Bern Statistics
//!
//! For every relation we record how many tails each head has on average (tph)
//! and how many heads each tail has (hpt). Corrupting the tail of a 1-to-N
//! relation is likely to produce a true fact, so the tail is replaced with
//! probability `hpt / (tph + hpt)` (Wang et al. 2014).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::triple::{EntityId, RelationId, Triple};

/// Conventional file names inside a dataset directory.
pub const TRAIN_FILE: &str = "train2id.txt";
pub const VALID_FILE: &str = "valid2id.txt";
pub const TEST_FILE: &str = "test2id.txt";
pub const ENTITY_FILE: &str = "entity2id.txt";
pub const RELATION_FILE: &str = "relation2id.txt";
pub const TYPE_CONSTRAINT_FILE: &str = "type_constrain.txt";

/// Which partition of the dataset a triple belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    pub fn name(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Valid => "valid",
            Self::Test => "test",
        }
    }
}

/// How the sampler decides between corrupting the head and the tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiasMode {
    /// Fair coin for every relation.
    #[default]
    Uniform,
    /// Per-relation bias from tph/hpt statistics.
    Bern,
}

/// Paths of the files making up a dataset.
#[derive(Debug, Clone)]
pub struct DatasetPaths {
    pub train: PathBuf,
    pub valid: PathBuf,
    pub test: PathBuf,
    /// File whose first line fixes the entity total.
    pub entities: Option<PathBuf>,
    /// File whose first line fixes the relation total.
    pub relations: Option<PathBuf>,
    pub type_constraints: Option<PathBuf>,
}

impl DatasetPaths {
    /// Just the three split files; totals are inferred from the ids.
    pub fn new(
        train: impl Into<PathBuf>,
        valid: impl Into<PathBuf>,
        test: impl Into<PathBuf>,
    ) -> Self {
        Self {
            train: train.into(),
            valid: valid.into(),
            test: test.into(),
            entities: None,
            relations: None,
            type_constraints: None,
        }
    }

    /// Conventional layout of a dataset directory.
    ///
    /// The split files are required; the total and type constraint files are
    /// picked up only if they exist.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let optional = |name: &str| {
            let path = dir.join(name);
            path.is_file().then_some(path)
        };
        Self {
            train: dir.join(TRAIN_FILE),
            valid: dir.join(VALID_FILE),
            test: dir.join(TEST_FILE),
            entities: optional(ENTITY_FILE),
            relations: optional(RELATION_FILE),
            type_constraints: optional(TYPE_CONSTRAINT_FILE),
        }
    }
}

/// Degree statistics of one relation over the training split.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RelationStats {
    pub triples: usize,
    pub distinct_heads: usize,
    pub distinct_tails: usize,
}

impl RelationStats {
    /// Average number of tails per head.
    pub fn tails_per_head(&self) -> f32 {
        if self.distinct_heads == 0 {
            0.0
        } else {
            self.triples as f32 / self.distinct_heads as f32
        }
    }

    /// Average number of heads per tail.
    pub fn heads_per_tail(&self) -> f32 {
        if self.distinct_tails == 0 {
            0.0
        } else {
            self.triples as f32 / self.distinct_tails as f32
        }
    }

    /// Probability of corrupting the tail under the bern heuristic.
    ///
    /// Relations without training triples get a fair coin.
    pub fn tail_bias(&self) -> f32 {
        let tph = self.tails_per_head();
        let hpt = self.heads_per_tail();
        if tph + hpt <= 0.0 {
            0.5
        } else {
            hpt / (tph + hpt)
        }
    }
}

/// Allowed head and tail entities per relation.
///
/// Relations without lists are unconstrained: every entity is allowed.
#[derive(Debug, Clone, Default)]
pub struct TypeConstraints {
    heads: Vec<Option<Vec<EntityId>>>,
    tails: Vec<Option<Vec<EntityId>>>,
}

impl TypeConstraints {
    /// Build from per-relation candidate lists (index = relation id).
    pub fn new(heads: Vec<Vec<EntityId>>, tails: Vec<Vec<EntityId>>) -> Self {
        Self::from_lists(
            heads.into_iter().map(Some).collect(),
            tails.into_iter().map(Some).collect(),
        )
    }

    fn from_lists(
        mut heads: Vec<Option<Vec<EntityId>>>,
        mut tails: Vec<Option<Vec<EntityId>>>,
    ) -> Self {
        for list in heads.iter_mut().chain(tails.iter_mut()).flatten() {
            list.sort_unstable();
            list.dedup();
        }
        Self { heads, tails }
    }

    pub fn allows_head(&self, relation: RelationId, entity: EntityId) -> bool {
        allows(&self.heads, relation, entity)
    }

    pub fn allows_tail(&self, relation: RelationId, entity: EntityId) -> bool {
        allows(&self.tails, relation, entity)
    }

    /// Does `relation` carry its own allow-lists?
    pub fn is_constrained(&self, relation: RelationId) -> bool {
        matches!(self.heads.get(relation as usize), Some(Some(_)))
    }

    /// Relations with allow-lists.
    pub fn relation_count(&self) -> usize {
        self.heads.iter().filter(|l| l.is_some()).count()
    }
}

fn allows(lists: &[Option<Vec<EntityId>>], relation: RelationId, entity: EntityId) -> bool {
    match lists.get(relation as usize) {
        Some(Some(list)) => list.binary_search(&entity).is_ok(),
        _ => true,
    }
}

/// Summary counts for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphStoreStats {
    pub entity_count: usize,
    pub relation_count: usize,
    pub train_count: usize,
    pub valid_count: usize,
    pub test_count: usize,
    pub has_type_constraints: bool,
}

/// Immutable store of the train/valid/test triples.
///
/// Every id in every split is guaranteed to be below the entity or relation
/// total; construction fails otherwise.
#[derive(Debug, Clone)]
pub struct GraphStore {
    entity_count: usize,
    relation_count: usize,
    train: Vec<Triple>,
    valid: Vec<Triple>,
    test: Vec<Triple>,
    train_set: HashSet<Triple>,
    known_set: HashSet<Triple>,
    relation_stats: Vec<RelationStats>,
    type_constraints: Option<TypeConstraints>,
}

impl GraphStore {
    /// Build a store from in-memory splits, checking every id against the totals.
    pub fn new(
        entity_count: usize,
        relation_count: usize,
        train: Vec<Triple>,
        valid: Vec<Triple>,
        test: Vec<Triple>,
    ) -> Result<Self> {
        for (split, triples) in [
            (Split::Train, &train),
            (Split::Valid, &valid),
            (Split::Test, &test),
        ] {
            let origin = PathBuf::from(format!("<{}>", split.name()));
            for (i, t) in triples.iter().enumerate() {
                check_triple(&origin, i + 1, *t, entity_count, relation_count)?;
            }
        }
        Ok(Self::assemble(entity_count, relation_count, train, valid, test))
    }

    /// Load the three split files, inferring totals from the largest ids.
    pub fn load(
        train_path: impl AsRef<Path>,
        valid_path: impl AsRef<Path>,
        test_path: impl AsRef<Path>,
    ) -> Result<Self> {
        Self::load_paths(&DatasetPaths::new(
            train_path.as_ref(),
            valid_path.as_ref(),
            test_path.as_ref(),
        ))
    }

    /// Load a dataset directory with the conventional file names.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Self::load_paths(&DatasetPaths::from_dir(dir))
    }

    /// Load every file named in `paths`.
    pub fn load_paths(paths: &DatasetPaths) -> Result<Self> {
        let entity_total = paths.entities.as_deref().map(read_total).transpose()?;
        let relation_total = paths.relations.as_deref().map(read_total).transpose()?;

        let train = read_triples(&paths.train, entity_total, relation_total)?;
        let valid = read_triples(&paths.valid, entity_total, relation_total)?;
        let test = read_triples(&paths.test, entity_total, relation_total)?;

        let all = || train.iter().chain(&valid).chain(&test);
        let entity_count = entity_total.unwrap_or_else(|| {
            all()
                .map(|t| t.head.max(t.tail) as usize + 1)
                .max()
                .unwrap_or(0)
        });
        let relation_count = relation_total
            .unwrap_or_else(|| all().map(|t| t.relation as usize + 1).max().unwrap_or(0));

        let mut store = Self::assemble(entity_count, relation_count, train, valid, test);
        if let Some(path) = &paths.type_constraints {
            store.type_constraints = Some(read_type_constraints(path, entity_count, relation_count)?);
        }

        info!(
            entities = store.entity_count,
            relations = store.relation_count,
            train = store.train.len(),
            valid = store.valid.len(),
            test = store.test.len(),
            type_constraints = store.type_constraints.is_some(),
            "loaded dataset from {}",
            paths.train.display()
        );
        Ok(store)
    }

    fn assemble(
        entity_count: usize,
        relation_count: usize,
        train: Vec<Triple>,
        valid: Vec<Triple>,
        test: Vec<Triple>,
    ) -> Self {
        let train_set: HashSet<Triple> = train.iter().copied().collect();
        let mut known_set = train_set.clone();
        known_set.extend(valid.iter().copied());
        known_set.extend(test.iter().copied());
        let relation_stats = relation_stats(&train, relation_count);
        Self {
            entity_count,
            relation_count,
            train,
            valid,
            test,
            train_set,
            known_set,
            relation_stats,
            type_constraints: None,
        }
    }

    /// Attach type constraints to an in-memory store.
    pub fn with_type_constraints(mut self, constraints: TypeConstraints) -> Self {
        self.type_constraints = Some(constraints);
        self
    }

    pub fn entity_count(&self) -> usize {
        self.entity_count
    }

    pub fn relation_count(&self) -> usize {
        self.relation_count
    }

    pub fn train_count(&self) -> usize {
        self.train.len()
    }

    pub fn valid_count(&self) -> usize {
        self.valid.len()
    }

    pub fn test_count(&self) -> usize {
        self.test.len()
    }

    /// All triples of a split, in file order.
    pub fn triples(&self, split: Split) -> &[Triple] {
        match split {
            Split::Train => &self.train,
            Split::Valid => &self.valid,
            Split::Test => &self.test,
        }
    }

    /// Random access into a split.
    pub fn triple(&self, split: Split, index: usize) -> Option<Triple> {
        self.triples(split).get(index).copied()
    }

    /// Is this exact triple in the training split?
    pub fn is_train_triple(&self, triple: &Triple) -> bool {
        self.train_set.contains(triple)
    }

    /// Is this exact triple in any split?
    pub fn is_known_triple(&self, triple: &Triple) -> bool {
        self.known_set.contains(triple)
    }

    pub fn relation_stats(&self, relation: RelationId) -> Option<&RelationStats> {
        self.relation_stats.get(relation as usize)
    }

    /// Probability of corrupting the tail (rather than the head) of a triple
    /// with this relation.
    pub fn corruption_bias(&self, relation: RelationId, mode: BiasMode) -> f32 {
        match mode {
            BiasMode::Uniform => 0.5,
            BiasMode::Bern => self
                .relation_stats
                .get(relation as usize)
                .map_or(0.5, RelationStats::tail_bias),
        }
    }

    pub fn type_constraints(&self) -> Option<&TypeConstraints> {
        self.type_constraints.as_ref()
    }

    pub fn stats(&self) -> GraphStoreStats {
        GraphStoreStats {
            entity_count: self.entity_count,
            relation_count: self.relation_count,
            train_count: self.train.len(),
            valid_count: self.valid.len(),
            test_count: self.test.len(),
            has_type_constraints: self.type_constraints.is_some(),
        }
    }
}

fn relation_stats(train: &[Triple], relation_count: usize) -> Vec<RelationStats> {
    let mut stats = vec![RelationStats::default(); relation_count];
    let mut heads: HashSet<(RelationId, EntityId)> = HashSet::new();
    let mut tails: HashSet<(RelationId, EntityId)> = HashSet::new();

    for t in train {
        let Some(entry) = stats.get_mut(t.relation as usize) else {
            continue;
        };
        entry.triples += 1;
        if heads.insert((t.relation, t.head)) {
            entry.distinct_heads += 1;
        }
        if tails.insert((t.relation, t.tail)) {
            entry.distinct_tails += 1;
        }
    }
    stats
}

fn check_triple(
    path: &Path,
    line: usize,
    t: Triple,
    entity_count: usize,
    relation_count: usize,
) -> Result<()> {
    for (kind, id, limit) in [
        ("entity", t.head, entity_count),
        ("entity", t.tail, entity_count),
        ("relation", t.relation, relation_count),
    ] {
        if id as usize >= limit {
            return Err(Error::IdOutOfRange {
                path: path.to_path_buf(),
                line,
                kind,
                id: u64::from(id),
                limit,
            });
        }
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::data_format(path, 0, format!("cannot read file: {e}")))
}

/// Non-blank lines with their 1-based line numbers.
fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty())
}

fn parse_count(path: &Path, line: usize, token: &str) -> Result<usize> {
    token
        .parse::<usize>()
        .map_err(|_| Error::data_format(path, line, format!("expected a count, found {token:?}")))
}

fn parse_id(
    path: &Path,
    line: usize,
    token: &str,
    kind: &'static str,
    limit: Option<usize>,
) -> Result<u32> {
    let id = token
        .parse::<u64>()
        .map_err(|_| Error::data_format(path, line, format!("expected {kind} id, found {token:?}")))?;
    let limit = limit.unwrap_or(u32::MAX as usize);
    if id >= limit as u64 {
        return Err(Error::IdOutOfRange {
            path: path.to_path_buf(),
            line,
            kind,
            id,
            limit,
        });
    }
    Ok(id as u32)
}

/// Read the leading total of an `entity2id.txt` / `relation2id.txt` style file.
pub fn read_total(path: &Path) -> Result<usize> {
    let text = read_file(path)?;
    let (line, first) = content_lines(&text)
        .next()
        .ok_or_else(|| Error::data_format(path, 1, "missing total line"))?;
    let token = first.split_whitespace().next().unwrap_or(first);
    parse_count(path, line, token)
}

/// Read a split file, rejecting bad counts, wrong column counts, and ids at or
/// above the given totals.
pub fn read_triples(
    path: &Path,
    entity_total: Option<usize>,
    relation_total: Option<usize>,
) -> Result<Vec<Triple>> {
    let text = read_file(path)?;
    let mut lines = content_lines(&text);
    let (count_line, first) = lines
        .next()
        .ok_or_else(|| Error::data_format(path, 1, "missing triple count line"))?;
    let expected = parse_count(path, count_line, first)?;

    let mut triples = Vec::with_capacity(expected);
    for (line, content) in lines {
        if triples.len() == expected {
            return Err(Error::data_format(
                path,
                line,
                format!("more triples than the declared count {expected}"),
            ));
        }
        let cols: Vec<&str> = content.split_whitespace().collect();
        if cols.len() != 3 {
            return Err(Error::data_format(
                path,
                line,
                format!("expected 3 columns (head tail relation), found {}", cols.len()),
            ));
        }
        let head = parse_id(path, line, cols[0], "entity", entity_total)?;
        let tail = parse_id(path, line, cols[1], "entity", entity_total)?;
        let relation = parse_id(path, line, cols[2], "relation", relation_total)?;
        triples.push(Triple::new(head, tail, relation));
    }

    if triples.len() != expected {
        return Err(Error::data_format(
            path,
            count_line,
            format!("declared {expected} triples, found {}", triples.len()),
        ));
    }
    debug!(path = %path.display(), triples = triples.len(), "read split");
    Ok(triples)
}

/// Read a `type_constrain.txt` file.
pub fn read_type_constraints(
    path: &Path,
    entity_count: usize,
    relation_count: usize,
) -> Result<TypeConstraints> {
    let text = read_file(path)?;
    let mut lines = content_lines(&text);
    let (count_line, first) = lines
        .next()
        .ok_or_else(|| Error::data_format(path, 1, "missing relation count line"))?;
    let declared = parse_count(path, count_line, first)?;
    if declared > relation_count {
        return Err(Error::data_format(
            path,
            count_line,
            format!("declares {declared} relations but the dataset has {relation_count}"),
        ));
    }

    let mut heads = vec![None; relation_count];
    let mut tails = vec![None; relation_count];
    let parse_list = |line: usize, content: &str| -> Result<(RelationId, Vec<EntityId>)> {
        let mut cols = content.split_whitespace();
        let rel_token = cols.next().unwrap_or_default();
        let relation = parse_id(path, line, rel_token, "relation", Some(relation_count))?;
        let n_token = cols
            .next()
            .ok_or_else(|| Error::data_format(path, line, "missing candidate count"))?;
        let n = parse_count(path, line, n_token)?;
        let ids = cols
            .map(|tok| parse_id(path, line, tok, "entity", Some(entity_count)))
            .collect::<Result<Vec<_>>>()?;
        if ids.len() != n {
            return Err(Error::data_format(
                path,
                line,
                format!("declared {n} candidates, found {}", ids.len()),
            ));
        }
        Ok((relation, ids))
    };

    for _ in 0..declared {
        for target in [&mut heads, &mut tails] {
            let (line, content) = lines
                .next()
                .ok_or_else(|| Error::data_format(path, count_line, "truncated constraint list"))?;
            let (relation, ids) = parse_list(line, content)?;
            target[relation as usize] = Some(ids);
        }
    }
    Ok(TypeConstraints::from_lists(heads, tails))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn small_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), TRAIN_FILE, "3\n0 1 0\n1 2 0\n0 2 1\n");
        write(dir.path(), VALID_FILE, "1\n2 3 0\n");
        write(dir.path(), TEST_FILE, "1\n3 0 1\n");
        dir
    }

    #[test]
    fn test_load_infers_totals() {
        let dir = small_dir();
        let store = GraphStore::from_dir(dir.path()).unwrap();

        assert_eq!(store.entity_count(), 4);
        assert_eq!(store.relation_count(), 2);
        assert_eq!(store.train_count(), 3);
        assert_eq!(store.valid_count(), 1);
        assert_eq!(store.test_count(), 1);
        assert_eq!(store.triple(Split::Train, 1), Some(Triple::new(1, 2, 0)));
        assert_eq!(store.triple(Split::Test, 1), None);
        assert!(store.is_train_triple(&Triple::new(0, 2, 1)));
        assert!(!store.is_train_triple(&Triple::new(2, 3, 0)));
        assert!(store.is_known_triple(&Triple::new(2, 3, 0)));
    }

    #[test]
    fn test_declared_totals_reject_out_of_range() {
        let dir = small_dir();
        write(dir.path(), ENTITY_FILE, "3\n");
        let err = GraphStore::from_dir(dir.path()).unwrap_err();
        match err {
            Error::IdOutOfRange { kind, id, limit, .. } => {
                assert_eq!(kind, "entity");
                assert_eq!(id, 3);
                assert_eq!(limit, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wrong_column_count_names_line() {
        let dir = small_dir();
        let path = write(dir.path(), TRAIN_FILE, "2\n0 1 0\n1 2\n");
        let err = GraphStore::from_dir(dir.path()).unwrap_err();
        match err {
            Error::DataFormat { path: p, line, .. } => {
                assert_eq!(p, path);
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_count_mismatch_is_rejected() {
        let dir = small_dir();
        write(dir.path(), TRAIN_FILE, "4\n0 1 0\n1 2 0\n");
        assert!(matches!(
            GraphStore::from_dir(dir.path()),
            Err(Error::DataFormat { .. })
        ));

        write(dir.path(), TRAIN_FILE, "1\n0 1 0\n1 2 0\n");
        assert!(matches!(
            GraphStore::from_dir(dir.path()),
            Err(Error::DataFormat { line: 3, .. })
        ));
    }

    #[test]
    fn test_missing_file_is_data_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = GraphStore::from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, Error::DataFormat { line: 0, .. }));
    }

    #[test]
    fn test_in_memory_store_validates_ids() {
        let err = GraphStore::new(2, 1, vec![Triple::new(0, 2, 0)], vec![], vec![]).unwrap_err();
        assert!(matches!(err, Error::IdOutOfRange { line: 1, .. }));

        let err = GraphStore::new(3, 1, vec![], vec![], vec![Triple::new(0, 1, 1)]).unwrap_err();
        assert!(matches!(err, Error::IdOutOfRange { kind: "relation", .. }));
    }

    #[test]
    fn test_bern_bias() {
        // Relation 0 is 1-to-N: one head, three tails.
        let train = vec![
            Triple::new(0, 1, 0),
            Triple::new(0, 2, 0),
            Triple::new(0, 3, 0),
        ];
        let store = GraphStore::new(4, 2, train, vec![], vec![]).unwrap();
        let stats = store.relation_stats(0).unwrap();
        assert!((stats.tails_per_head() - 3.0).abs() < 1e-6);
        assert!((stats.heads_per_tail() - 1.0).abs() < 1e-6);

        // Tail corruption is discouraged for 1-to-N relations.
        assert!((store.corruption_bias(0, BiasMode::Bern) - 0.25).abs() < 1e-6);
        assert!((store.corruption_bias(0, BiasMode::Uniform) - 0.5).abs() < 1e-6);
        // Relation without training triples.
        assert!((store.corruption_bias(1, BiasMode::Bern) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_type_constraints() {
        let dir = small_dir();
        write(
            dir.path(),
            TYPE_CONSTRAINT_FILE,
            "2\n0 2 0 1\n0 2 1 2\n1 1 0\n1 2 2 0\n",
        );
        let store = GraphStore::from_dir(dir.path()).unwrap();
        let tc = store.type_constraints().unwrap();
        assert_eq!(tc.relation_count(), 2);
        assert!(tc.allows_head(0, 1));
        assert!(!tc.allows_head(0, 2));
        assert!(tc.allows_tail(1, 0));
        assert!(!tc.allows_tail(1, 1));
    }

    #[test]
    fn test_undeclared_relation_is_unconstrained() {
        let dir = small_dir();
        write(dir.path(), TYPE_CONSTRAINT_FILE, "1\n0 1 0\n0 1 1\n");
        let store = GraphStore::from_dir(dir.path()).unwrap();
        let tc = store.type_constraints().unwrap();
        assert_eq!(tc.relation_count(), 1);
        assert!(tc.is_constrained(0));
        assert!(!tc.allows_head(0, 2));
        assert!(!tc.is_constrained(1));
        for e in 0..4 {
            assert!(tc.allows_head(1, e));
            assert!(tc.allows_tail(1, e));
        }
    }

    #[test]
    fn test_type_constraint_count_mismatch() {
        let dir = small_dir();
        write(dir.path(), TYPE_CONSTRAINT_FILE, "1\n0 3 0 1\n0 1 1\n");
        let err = GraphStore::from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, Error::DataFormat { line: 2, .. }));
    }
}
