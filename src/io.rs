use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use phylotree::tree::Tree;
use tracing::{debug, warn};

use crate::error::{QuartetError, Result};
use crate::scores::QuartetScores;
use crate::tree::IndexedTree;

/// Evaluation trees as Newick strings, parsed lazily by the counting workers.
#[derive(Debug, Clone, Default)]
pub struct EvaluationTrees {
    pub newicks: Vec<String>,
    /// NEXUS TRANSLATE table mapping tree labels to taxon names.
    pub translate: Option<HashMap<String, String>>,
}

impl EvaluationTrees {
    pub fn len(&self) -> usize {
        self.newicks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.newicks.is_empty()
    }
}

fn is_gz(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".gz")
}

/// Read a whole text file, decompressing it if the path ends with `.gz`.
pub fn read_text<P: AsRef<Path>>(path: P) -> Result<String> {
    let p = path.as_ref();
    let file = File::open(p)?;
    let mut content = String::new();
    if is_gz(p) {
        MultiGzDecoder::new(BufReader::new(file)).read_to_string(&mut content)?;
    } else {
        BufReader::new(file).read_to_string(&mut content)?;
    }
    Ok(content)
}

/// Strip BEAST annotations from Newick strings.
///
/// BEAST writes annotations like `:[&rate=0.123]2.45` where 2.45 is the
/// branch length. The `[&...]` blocks are removed, lengths are kept.
fn strip_beast_annotations(newick: &str) -> String {
    let mut result = String::with_capacity(newick.len());
    let mut in_annotation = false;
    let mut chars = newick.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '[' && chars.peek() == Some(&'&') {
            in_annotation = true;
        } else if ch == ']' && in_annotation {
            in_annotation = false;
        } else if !in_annotation {
            result.push(ch);
        }
    }

    result
}

fn is_nexus(content: &str) -> bool {
    content.trim_start().to_ascii_uppercase().starts_with("#NEXUS")
}

struct TreeBlock<'a> {
    header: &'a str,
    body: &'a str,
}

fn collect_tree_blocks(content: &str) -> Vec<TreeBlock<'_>> {
    content
        .lines()
        .skip_while(|line| !line.trim_start().to_ascii_uppercase().starts_with("TREE "))
        .take_while(|line| !line.trim().to_ascii_uppercase().starts_with("END;"))
        .filter_map(|line| {
            let (header, body) = split_tree_line(line)?;
            Some(TreeBlock { header: header.trim(), body: body.trim() })
        })
        .collect()
}

/// Split `tree NAME [&comment] = newick` at the first `=` outside brackets.
fn split_tree_line(line: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, ch) in line.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '=' if depth == 0 => return Some((&line[..i], &line[i + 1..])),
            _ => {}
        }
    }
    None
}

fn parse_translate_block(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .skip_while(|line| !line.trim().to_ascii_uppercase().starts_with("TRANSLATE"))
        .skip(1)
        .take_while(|line| !line.trim().starts_with(';'))
        // 1 '1959.M.CD.59.ZR59',
        // 2 '1960.DRC60A',
        .filter_map(|line| {
            let line = line.trim().trim_end_matches([',', ';']);
            let mut parts = line.split_whitespace();
            let id = parts.next()?.to_string();
            let label = parts.next()?.trim_matches('\'').to_string();
            Some((id, label))
        })
        .collect()
}

/// Split a file of Newick trees on the `;` terminating each tree, ignoring
/// `;` inside quoted labels and comments.
fn split_newick(content: &str) -> Vec<String> {
    let mut trees = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut comment_depth = 0usize;

    for ch in content.chars() {
        match ch {
            '\'' if comment_depth == 0 => in_quote = !in_quote,
            '[' if !in_quote => comment_depth += 1,
            ']' if !in_quote => comment_depth = comment_depth.saturating_sub(1),
            _ => {}
        }
        if ch.is_whitespace() && !in_quote {
            continue;
        }
        current.push(ch);
        if ch == ';' && !in_quote && comment_depth == 0 {
            trees.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        warn!(chars = current.len(), "Ignoring trailing tree without terminating ';'");
    }
    trees
}

/// Parse evaluation trees from a Newick or NEXUS/BEAST document, dropping
/// the first `burnin_trees` trees.
pub fn parse_evaluation_trees(content: &str, burnin_trees: usize) -> EvaluationTrees {
    if is_nexus(content) {
        let translate = parse_translate_block(content);
        let blocks = collect_tree_blocks(content);
        debug!(trees = blocks.len(), translated = translate.len(), "Parsed NEXUS tree blocks");
        let newicks = blocks
            .iter()
            .skip(burnin_trees)
            .map(|block| {
                debug!(header = block.header, "Keeping tree");
                strip_beast_annotations(block.body).trim().to_string()
            })
            .collect();
        EvaluationTrees { newicks, translate: (!translate.is_empty()).then_some(translate) }
    } else {
        let newicks = split_newick(content)
            .iter()
            .skip(burnin_trees)
            .map(|newick| strip_beast_annotations(newick))
            .collect();
        EvaluationTrees { newicks, translate: None }
    }
}

pub fn read_evaluation_trees<P: AsRef<Path>>(path: P, burnin_trees: usize) -> Result<EvaluationTrees> {
    let content = read_text(path.as_ref())?;
    let trees = parse_evaluation_trees(&content, burnin_trees);
    if trees.is_empty() {
        return Err(QuartetError::NoEvaluationTrees);
    }
    Ok(trees)
}

/// Rename leaves through a TRANSLATE table, keeping names it does not list.
pub fn rename_leaf_nodes(phylo_tree: &mut Tree, translate: &HashMap<String, String>) {
    for leaf_id in phylo_tree.get_leaves() {
        if let Ok(node) = phylo_tree.get_mut(&leaf_id)
            && let Some(label) = node.name.as_ref().and_then(|n| translate.get(n))
        {
            node.name = Some(label.clone());
        }
    }
}

/// Parse the first tree of a Newick or NEXUS document as the reference tree.
pub fn parse_reference_tree(content: &str) -> Result<IndexedTree> {
    let trees = parse_evaluation_trees(content, 0);
    let Some(first) = trees.newicks.first() else {
        return Err(QuartetError::Newick { index: 0, message: "no tree found".to_string() });
    };
    let mut tree = Tree::from_newick(first)
        .map_err(|e| QuartetError::Newick { index: 0, message: e.to_string() })?;
    if let Some(translate) = &trees.translate {
        rename_leaf_nodes(&mut tree, translate);
    }
    IndexedTree::from_phylo(&tree)
}

pub fn read_reference_tree<P: AsRef<Path>>(path: P) -> Result<IndexedTree> {
    parse_reference_tree(&read_text(path)?)
}

/// The reference tree with every inner node labelled by the scores of the
/// edge above it, as `qp-ic=..;lq-ic=..;eqp-ic=..`.
pub fn annotated_newick(tree: &IndexedTree, scores: &QuartetScores) -> String {
    tree.to_newick(|node| {
        let (lq, qp, eqp) = scores.edge(tree.parent_edge(node)?);
        Some(format!("qp-ic={qp:.6};lq-ic={lq:.6};eqp-ic={eqp:.6}"))
    })
}

/// Open `path` for writing. If `path` ends with `.gz`, the output is
/// gzip-compressed; `-` is rejected.
fn create_writer(p: &Path) -> io::Result<Box<dyn Write>> {
    if p.as_os_str() == "-" {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "writing to stdout is not supported",
        ));
    }
    let file = File::create(p)?;
    if is_gz(p) {
        Ok(Box::new(BufWriter::new(GzEncoder::new(file, Compression::default()))))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

pub fn write_annotated_newick<P: AsRef<Path>>(
    path: P,
    tree: &IndexedTree,
    scores: &QuartetScores,
) -> io::Result<()> {
    let mut out = create_writer(path.as_ref())?;
    writeln!(&mut out, "{}", annotated_newick(tree, scores))?;
    out.flush()
}

/// Write one row per edge: id, child node, LQ-IC, QP-IC, EQP-IC.
///
/// The child is named by its label, or `#<node id>` for unlabelled inner nodes.
pub fn write_scores_tsv<P: AsRef<Path>>(
    path: P,
    tree: &IndexedTree,
    scores: &QuartetScores,
) -> io::Result<()> {
    let mut out = create_writer(path.as_ref())?;

    writeln!(&mut out, "edge\tchild\tlq_ic\tqp_ic\teqp_ic")?;
    for edge in 0..scores.edge_count() {
        let child = tree.edge_child(edge);
        let (lq, qp, eqp) = scores.edge(edge);
        match tree.name(child) {
            Some(name) => write!(&mut out, "{edge}\t{name}")?,
            None => write!(&mut out, "{edge}\t#{child}")?,
        }
        writeln!(&mut out, "\t{lq:.6}\t{qp:.6}\t{eqp:.6}")?;
    }

    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::QuartetTable;
    use crate::memory::LookupStrategy;
    use crate::metaquartet::QuartetScoreComputer;
    use crate::taxa::TaxonMap;
    use crate::config::EnumerationMode;
    use std::path::PathBuf;

    const BEAST: &str = "#NEXUS

Begin taxa;
\tDimensions ntax=5;
End;
Begin trees;
\tTranslate
\t\t1 'Homo',
\t\t2 'Pan',
\t\t3 'Gorilla',
\t\t4 'Pongo',
\t\t5 'Hylobates'
\t\t;
tree STATE_0 = ((1:[&rate=0.5]1.0,2:1.0):0.5,(3:1.0,4:1.0):0.5,5:2.0);
tree STATE_1000 = ((1:1.0,3:1.0):0.5,(2:1.0,4:1.0):0.5,5:2.0);
tree STATE_2000 = ((1:1.0,2:1.0):0.5,(3:1.0,4:1.0):0.5,5:2.0);
End;
";

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("quartet-scores-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_strip_beast_annotations() {
        assert_eq!(strip_beast_annotations("(A:[&rate=1]0.5,B:1[&x=2]);"), "(A:0.5,B:1);");
        assert_eq!(strip_beast_annotations("(A,B)[comment];"), "(A,B)[comment];");
    }

    #[test]
    fn test_split_newick() {
        let trees = split_newick("((A,B),C,D);\n(A,(B,C),D);\n\n('x;y',B,C)[c;d];");
        assert_eq!(trees, vec!["((A,B),C,D);", "(A,(B,C),D);", "('x;y',B,C)[c;d];"]);
    }

    #[test]
    fn test_parse_beast_document() {
        let trees = parse_evaluation_trees(BEAST, 1);
        assert_eq!(trees.len(), 2);
        assert!(!trees.newicks[0].contains("[&"));
        let translate = trees.translate.unwrap();
        assert_eq!(translate.len(), 5);
        assert_eq!(translate["1"], "Homo");
        assert_eq!(translate["5"], "Hylobates");
    }

    #[test]
    fn test_beast1_header_annotations_stay_in_header() {
        let document = "#NEXUS
Begin trees;
tree STATE_0 [&lnP=-1234.5,posterior=-1300.2] = [&R] ((1:1.0,2:1.0):0.5,(3:1.0,4:1.0):0.5,5:2.0);
End;
";
        let blocks = collect_tree_blocks(document);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].header, "tree STATE_0 [&lnP=-1234.5,posterior=-1300.2]");
        assert!(blocks[0].body.starts_with("[&R] ((1:1.0"));

        let trees = parse_evaluation_trees(document, 0);
        assert_eq!(trees.newicks, vec!["((1:1.0,2:1.0):0.5,(3:1.0,4:1.0):0.5,5:2.0);"]);
        let tree = IndexedTree::from_newick(&trees.newicks[0]).unwrap();
        assert_eq!(tree.leaf_count(), 5);
    }

    #[test]
    fn test_split_tree_line() {
        assert_eq!(split_tree_line("tree A = (x,y);"), Some(("tree A ", " (x,y);")));
        assert_eq!(split_tree_line("tree A [&a=1] =(x,y);"), Some(("tree A [&a=1] ", "(x,y);")));
        assert_eq!(split_tree_line("tree A [&a=1]"), None);
    }

    #[test]
    fn test_unterminated_trailing_tree_is_dropped() {
        let trees = split_newick("((A,B),C,D);\n(A,(B,C),D)\n");
        assert_eq!(trees, vec!["((A,B),C,D);"]);
    }

    #[test]
    fn test_plain_newick_annotations_stripped() {
        let trees = parse_evaluation_trees("[&R] ((A:[&rate=0.5]1.0,B:1.0),C,D);\n", 0);
        assert_eq!(trees.newicks, vec!["((A:1.0,B:1.0),C,D);"]);
        assert_eq!(IndexedTree::from_newick(&trees.newicks[0]).unwrap().leaf_count(), 4);
    }

    #[test]
    fn test_plain_newick_burnin() {
        let trees = parse_evaluation_trees("(A,B,(C,D));\n((A,C),B,D);\n(A,C,(B,D));\n", 2);
        assert_eq!(trees.newicks, vec!["(A,C,(B,D));"]);
        assert!(trees.translate.is_none());
    }

    #[test]
    fn test_reference_from_nexus_uses_translated_names() {
        let tree = parse_reference_tree(BEAST).unwrap();
        assert_eq!(tree.leaf_count(), 5);
        assert!(tree.find_leaf("Homo").is_some());
        assert!(tree.find_leaf("1").is_none());
    }

    #[test]
    fn test_gz_roundtrip() {
        let path = temp_path("trees.nwk.gz");
        {
            let mut out = create_writer(&path).unwrap();
            writeln!(&mut out, "((A,B),C,(D,E));").unwrap();
            writeln!(&mut out, "((A,C),B,(D,E));").unwrap();
            out.flush().unwrap();
        }
        let trees = read_evaluation_trees(&path, 0).unwrap();
        assert_eq!(trees.len(), 2);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let path = temp_path("empty.nwk");
        std::fs::write(&path, "\n").unwrap();
        assert!(matches!(read_evaluation_trees(&path, 0), Err(QuartetError::NoEvaluationTrees)));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_outputs() {
        let tree = IndexedTree::from_newick("((A,B),C,(D,E));").unwrap();
        let taxa = TaxonMap::from_reference(&tree).unwrap();
        let node_taxa = taxa.reference_taxa(&tree).unwrap();
        let newicks = vec!["((A,B),C,(D,E));".to_string()];
        let table = QuartetTable::build(LookupStrategy::Dense, &taxa, &newicks, None).unwrap();
        let scores = QuartetScoreComputer::new(&tree, &node_taxa, &table)
            .compute(EnumerationMode::NodePairs)
            .unwrap();

        let annotated = annotated_newick(&tree, &scores);
        assert_eq!(annotated.matches("'qp-ic=1.000000;lq-ic=1.000000;eqp-ic=1.000000'").count(), 2);

        let path = temp_path("scores.tsv");
        write_scores_tsv(&path, &tree, &scores).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "edge\tchild\tlq_ic\tqp_ic\teqp_ic");
        assert_eq!(lines.len(), 1 + tree.edge_count());
        assert!(lines.iter().any(|l| l.ends_with("\tinf\tinf\tinf")));
        std::fs::remove_file(&path).unwrap();

        assert!(write_annotated_newick("-", &tree, &scores).is_err());
    }
}
