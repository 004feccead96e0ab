//! Clip ordering.
//!
//! A camera that was stopped and restarted leaves a pile of clips whose last
//! frame looks almost exactly like the next clip's first frame. The linker
//! scores every cross-clip pair of boundary frames, turns the best matches
//! into predecessor → successor edges and accepts the result only when the
//! edges form one unbroken chain through every clip.
//!
//! Boundary frames live in a 2N×2N matrix: index `2i` is clip `i`'s first
//! frame and `2i + 1` its last frame.

use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use duocam_models::{Camera, LinkingMethod};

use crate::error::{MediaError, MediaResult};
use crate::frame::{FfmpegFrameReader, Frame, FrameSource};
use crate::similarity::similarity;

/// Predecessor clip index → successor clip indices.
pub type LinkGraph = BTreeMap<usize, Vec<usize>>;

/// Opens a clip as a frame stream.
pub trait ClipOpener: Send + Sync {
    fn open(&self, clip: &Path) -> MediaResult<Box<dyn FrameSource>>;
}

impl<F> ClipOpener for F
where
    F: Fn(&Path) -> MediaResult<Box<dyn FrameSource>> + Send + Sync,
{
    fn open(&self, clip: &Path) -> MediaResult<Box<dyn FrameSource>> {
        self(clip)
    }
}

/// Opens clips with FFmpeg.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegClipOpener;

impl ClipOpener for FfmpegClipOpener {
    fn open(&self, clip: &Path) -> MediaResult<Box<dyn FrameSource>> {
        Ok(Box::new(FfmpegFrameReader::open(clip)?))
    }
}

/// Linker configuration.
#[derive(Debug, Clone, Copy)]
pub struct LinkerConfig {
    /// Edge selection method
    pub method: LinkingMethod,
    /// How far before the reported end to start looking for the last frame
    pub tail_seconds: f64,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            method: LinkingMethod::GreedyTopK,
            tail_seconds: 2.0,
        }
    }
}

impl LinkerConfig {
    pub fn with_method(mut self, method: LinkingMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_tail_seconds(mut self, seconds: f64) -> Self {
        self.tail_seconds = seconds.max(0.0);
        self
    }
}

/// First and last decodable frame of a clip.
#[derive(Debug, Clone)]
pub struct ClipEnds {
    pub first: Frame,
    pub last: Frame,
}

/// Orders one camera's clips.
pub struct ClipLinker<O = FfmpegClipOpener> {
    opener: O,
    config: LinkerConfig,
}

impl ClipLinker<FfmpegClipOpener> {
    pub fn new(config: LinkerConfig) -> Self {
        Self::with_opener(FfmpegClipOpener, config)
    }
}

impl<O: ClipOpener> ClipLinker<O> {
    pub fn with_opener(opener: O, config: LinkerConfig) -> Self {
        Self { opener, config }
    }

    /// Return `clips` in recording order.
    pub fn link(&self, camera: Camera, clips: &[PathBuf]) -> MediaResult<Vec<PathBuf>> {
        match clips.len() {
            0 => {
                return Err(MediaError::EmptyInput(format!(
                    "no clips given for camera {}",
                    camera
                )))
            }
            1 => return Ok(clips.to_vec()),
            _ => {}
        }

        let n = clips.len();
        info!(camera = %camera, clips = n, method = %self.config.method, "Linking clips");

        let ends = clips
            .iter()
            .map(|clip| self.read_clip_ends(clip))
            .collect::<MediaResult<Vec<_>>>()?;

        let matrix = similarity_matrix(&ends)?;
        let graph = match self.config.method {
            LinkingMethod::GreedyTopK => greedy_edges(&matrix, n),
            LinkingMethod::Threshold { max_score } => threshold_edges(&matrix, n, max_score),
        };
        debug!(camera = %camera, ?graph, "Candidate link graph");

        let root = match check_linking_valid(&graph, n) {
            Ok(root) => root,
            Err(reason) => {
                warn!(camera = %camera, reason = %reason, "Cannot determine clip linking");
                metrics::counter!("duocam_linking_total", "outcome" => "failed").increment(1);
                return Err(MediaError::linking_failed(camera.to_string(), reason, clips.to_vec()));
            }
        };

        metrics::counter!("duocam_linking_total", "outcome" => "linked").increment(1);

        let order = walk_chain(&graph, root, n);
        Ok(order.into_iter().map(|i| clips[i].clone()).collect())
    }

    fn read_clip_ends(&self, clip: &Path) -> MediaResult<ClipEnds> {
        let mut source = self.opener.open(clip)?;
        let ends = read_ends(source.as_mut(), self.config.tail_seconds, clip);
        source.release();
        ends
    }
}

/// Read the first frame, then seek near the end and keep the last frame that decodes.
///
/// Reported durations are often slightly off, so the tail is read until the
/// stream stops yielding frames.
fn read_ends(source: &mut dyn FrameSource, tail_seconds: f64, clip: &Path) -> MediaResult<ClipEnds> {
    let first = source
        .read_next()?
        .ok_or_else(|| MediaError::decode_failed(clip, "first frame"))?;

    source.seek((source.duration() - tail_seconds).max(0.0))?;

    let mut last = None;
    while let Some(frame) = source.read_next()? {
        last = Some(frame);
    }
    let last = last.ok_or_else(|| MediaError::decode_failed(clip, "last frame"))?;

    Ok(ClipEnds { first, last })
}

fn endpoint(ends: &[ClipEnds], index: usize) -> &Frame {
    let clip = &ends[index / 2];
    if index % 2 == 0 {
        &clip.first
    } else {
        &clip.last
    }
}

/// Score every pair of boundary frames from different clips.
///
/// Only the upper triangle is computed; the lower one is mirrored and
/// same-clip entries stay zero.
pub fn similarity_matrix(ends: &[ClipEnds]) -> MediaResult<Vec<Vec<f64>>> {
    let size = ends.len() * 2;
    let pairs: Vec<(usize, usize)> = (0..size)
        .flat_map(|r| ((r + 1)..size).map(move |c| (r, c)))
        .filter(|(r, c)| r / 2 != c / 2)
        .collect();

    let scores = pairs
        .par_iter()
        .map(|&(r, c)| similarity(endpoint(ends, r), endpoint(ends, c)))
        .collect::<MediaResult<Vec<f64>>>()?;

    let mut matrix = vec![vec![0.0; size]; size];
    for (&(r, c), score) in pairs.iter().zip(scores) {
        matrix[r][c] = score;
        matrix[c][r] = score;
    }

    Ok(matrix)
}

fn add_edge(graph: &mut LinkGraph, from: usize, to: usize) {
    graph.entry(from).or_default().push(to);
}

/// Take the `n - 1` lowest-scoring cross-clip candidates as edges.
///
/// Candidates are not deduplicated by clip; conflicting picks are left for
/// [`check_linking_valid`] to reject. Ties keep candidate order.
pub fn greedy_edges(matrix: &[Vec<f64>], n: usize) -> LinkGraph {
    let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
    for r in 0..2 * n {
        for c in 0..2 * n {
            if r / 2 < c / 2 {
                candidates.push((r, c, matrix[r][c]));
            }
        }
    }
    candidates.sort_by(|a, b| a.2.total_cmp(&b.2));

    let mut graph = LinkGraph::new();
    for &(r, c, _) in candidates.iter().take(n.saturating_sub(1)) {
        if r % 2 == 0 {
            // c's frame matched r's first frame: c comes before r
            add_edge(&mut graph, c / 2, r / 2);
        } else {
            add_edge(&mut graph, r / 2, c / 2);
        }
    }
    graph
}

/// Link every last/first pair whose score is under `max_score`.
pub fn threshold_edges(matrix: &[Vec<f64>], n: usize, max_score: f64) -> LinkGraph {
    let mut graph = LinkGraph::new();
    for i in 0..n {
        for j in (i + 1)..n {
            if matrix[2 * i][2 * j + 1] < max_score {
                add_edge(&mut graph, j, i);
            }
            if matrix[2 * i + 1][2 * j] < max_score {
                add_edge(&mut graph, i, j);
            }
        }
    }
    graph
}

/// Check that `graph` is a single chain through all `n` clips and return its root.
pub fn check_linking_valid(graph: &LinkGraph, n: usize) -> Result<usize, String> {
    if graph.len() != n.saturating_sub(1) {
        return Err(format!(
            "expected {} linked clips, found {}",
            n.saturating_sub(1),
            graph.len()
        ));
    }

    let mut children: BTreeMap<usize, usize> = BTreeMap::new();
    for (&from, successors) in graph {
        if successors.len() != 1 {
            return Err(format!("clip {} has {} successors", from, successors.len()));
        }
        if successors[0] == from || successors[0] >= n || from >= n {
            return Err(format!("invalid edge {} -> {}", from, successors[0]));
        }
        *children.entry(successors[0]).or_default() += 1;
    }

    if let Some((child, count)) = children.iter().find(|(_, count)| **count != 1) {
        return Err(format!("clip {} has {} predecessors", child, count));
    }

    let keys: BTreeSet<usize> = graph.keys().copied().collect();
    let child_set: BTreeSet<usize> = children.keys().copied().collect();

    let roots: Vec<usize> = keys.difference(&child_set).copied().collect();
    if roots.len() != 1 {
        return Err(format!("expected one first clip, found {}", roots.len()));
    }

    let terminals = child_set.difference(&keys).count();
    if terminals != 1 {
        return Err(format!("expected one last clip, found {}", terminals));
    }

    let order = walk_chain(graph, roots[0], n);
    let visited: HashSet<usize> = order.iter().copied().collect();
    if order.len() != n || visited.len() != n {
        return Err(format!("chain covers {} of {} clips", visited.len(), n));
    }

    Ok(roots[0])
}

/// Follow successors from `root` at most `n - 1` times.
pub fn walk_chain(graph: &LinkGraph, root: usize, n: usize) -> Vec<usize> {
    let mut order = vec![root];
    let mut current = root;
    for _ in 1..n {
        match graph.get(&current).and_then(|s| s.first()) {
            Some(&next) => {
                order.push(next);
                current = next;
            }
            None => break,
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MemoryFrameSource;
    use image::{Rgb, RgbImage};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const FRAMES_PER_CLIP: usize = 6;

    fn noise(seed: u64, x: u32, y: u32) -> u8 {
        let mut v = seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add((x as u64) << 32 | y as u64);
        v ^= v >> 33;
        v = v.wrapping_mul(0xff51_afd7_ed55_8ccd);
        v ^= v >> 33;
        v = v.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
        v ^= v >> 33;
        v as u8
    }

    /// Frame `t` of a continuous recording; frames 2k and 2k+1 are identical.
    fn recording_frame(t: usize) -> Frame {
        let seed = (t / 2) as u64 + 1;
        Frame::new(RgbImage::from_fn(24, 16, |x, y| {
            let v = noise(seed, x, y);
            Rgb([v, v, v])
        }))
    }

    /// Cut a recording into `n` clips whose boundary frames match.
    fn cut_recording(n: usize) -> HashMap<PathBuf, Vec<Frame>> {
        (0..n)
            .map(|k| {
                let start = 1 + k * FRAMES_PER_CLIP;
                let frames = (start..start + FRAMES_PER_CLIP).map(recording_frame).collect();
                (PathBuf::from(format!("clip{}.mp4", k)), frames)
            })
            .collect()
    }

    fn opener(
        clips: HashMap<PathBuf, Vec<Frame>>,
        opened: Arc<AtomicUsize>,
    ) -> impl Fn(&Path) -> MediaResult<Box<dyn FrameSource>> + Send + Sync {
        move |path: &Path| {
            opened.fetch_add(1, Ordering::SeqCst);
            let frames = clips
                .get(path)
                .cloned()
                .ok_or_else(|| MediaError::FileNotFound(path.to_path_buf()))?;
            Ok(Box::new(MemoryFrameSource::new(path.display().to_string(), frames, 10.0))
                as Box<dyn FrameSource>)
        }
    }

    fn ordered_names(n: usize) -> Vec<PathBuf> {
        (0..n).map(|k| PathBuf::from(format!("clip{}.mp4", k))).collect()
    }

    /// A fixed shuffle of `0..n`.
    fn shuffled(n: usize) -> Vec<PathBuf> {
        let mut names = ordered_names(n);
        names.reverse();
        if n > 2 {
            names.swap(0, n / 2);
        }
        names
    }

    #[test]
    fn test_links_sequential_cuts() {
        for (n, method) in [1, 2, 3, 5]
            .into_iter()
            .flat_map(|n| [(n, LinkingMethod::GreedyTopK), (n, LinkingMethod::Threshold { max_score: 10.0 })])
        {
            let opened = Arc::new(AtomicUsize::new(0));
            let linker = ClipLinker::with_opener(
                opener(cut_recording(n), opened),
                LinkerConfig::default().with_method(method),
            );
            let order = linker.link(Camera::A, &shuffled(n)).unwrap();
            assert_eq!(order, ordered_names(n), "n = {n}, method = {method}");
        }
    }

    #[test]
    fn test_single_clip_reads_nothing() {
        let opened = Arc::new(AtomicUsize::new(0));
        let linker = ClipLinker::with_opener(opener(HashMap::new(), opened.clone()), LinkerConfig::default());
        let clips = vec![PathBuf::from("only.mp4")];
        assert_eq!(linker.link(Camera::B, &clips).unwrap(), clips);
        assert_eq!(opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_clips_is_input_error() {
        let linker = ClipLinker::with_opener(
            opener(HashMap::new(), Arc::new(AtomicUsize::new(0))),
            LinkerConfig::default(),
        );
        let err = linker.link(Camera::A, &[]).unwrap_err();
        assert!(err.is_input_validation());
    }

    #[test]
    fn test_identical_clips_fail_to_link() {
        let flat = Frame::filled(8, 8, [90, 90, 90]);
        let clips: HashMap<PathBuf, Vec<Frame>> = ordered_names(3)
            .into_iter()
            .map(|p| (p, vec![flat.clone(); 4]))
            .collect();
        let linker = ClipLinker::with_opener(
            opener(clips, Arc::new(AtomicUsize::new(0))),
            LinkerConfig::default(),
        );

        match linker.link(Camera::A, &ordered_names(3)) {
            Err(MediaError::LinkingFailed { camera, clips, .. }) => {
                assert_eq!(camera, "a");
                assert_eq!(clips.len(), 3);
            }
            other => panic!("expected linking failure, got {other:?}"),
        }
    }

    #[test]
    fn test_unrelated_clips_fail_threshold_linking() {
        let clips: HashMap<PathBuf, Vec<Frame>> = ordered_names(3)
            .into_iter()
            .enumerate()
            .map(|(k, p)| (p, vec![recording_frame(100 * k), recording_frame(100 * k + 50)]))
            .collect();
        let linker = ClipLinker::with_opener(
            opener(clips, Arc::new(AtomicUsize::new(0))),
            LinkerConfig::default().with_method(LinkingMethod::Threshold { max_score: 10.0 }),
        );
        assert!(matches!(
            linker.link(Camera::B, &ordered_names(3)),
            Err(MediaError::LinkingFailed { .. })
        ));
    }

    #[test]
    fn test_check_linking_valid_rejects_bad_graphs() {
        let chain: LinkGraph = [(2, vec![0]), (0, vec![1])].into_iter().collect();
        assert_eq!(check_linking_valid(&chain, 3), Ok(2));
        assert_eq!(walk_chain(&chain, 2, 3), vec![2, 0, 1]);

        let fork: LinkGraph = [(0, vec![1, 2])].into_iter().collect();
        assert!(check_linking_valid(&fork, 3).is_err());

        let merge: LinkGraph = [(0, vec![2]), (1, vec![2])].into_iter().collect();
        assert!(check_linking_valid(&merge, 3).is_err());

        let cycle: LinkGraph = [(0, vec![1]), (1, vec![0])].into_iter().collect();
        assert!(check_linking_valid(&cycle, 3).is_err());

        let short: LinkGraph = [(0, vec![1])].into_iter().collect();
        assert!(check_linking_valid(&short, 3).is_err());
    }

    #[test]
    fn test_greedy_direction_by_parity() {
        // clip1's last frame matches clip0's first frame
        let mut matrix = vec![vec![100.0; 4]; 4];
        matrix[0][3] = 0.0;
        matrix[3][0] = 0.0;
        let graph = greedy_edges(&matrix, 2);
        assert_eq!(graph.get(&1), Some(&vec![0]));

        // clip0's last frame matches clip1's first frame
        let mut matrix = vec![vec![100.0; 4]; 4];
        matrix[1][2] = 0.0;
        matrix[2][1] = 0.0;
        let graph = greedy_edges(&matrix, 2);
        assert_eq!(graph.get(&0), Some(&vec![1]));
    }

    #[test]
    fn test_read_ends_keeps_last_decodable_frame() {
        let frames: Vec<Frame> = (0..40).map(|t| Frame::filled(2, 2, [t as u8, 0, 0])).collect();
        let mut source = MemoryFrameSource::new("long", frames, 10.0);
        let ends = read_ends(&mut source, 2.0, Path::new("long")).unwrap();
        assert_eq!(ends.first.image().get_pixel(0, 0).0[0], 0);
        assert_eq!(ends.last.image().get_pixel(0, 0).0[0], 39);
    }
}
