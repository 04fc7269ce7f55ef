//! Song structure detection from timed lyrics.
//!
//! Lines that repeat across the song are treated as chorus material, runs of
//! same-typed lines become sections, and positional rules relabel some of the
//! remaining verses as pre-chorus, bridge, intro or outro. Instrumental gaps
//! are not sections; playback derives them from the lyric timeline.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::StructureConfig,
    lyrics::{self, LyricSegment},
    timeline::Lookup,
    Result, TimeIndex,
};

/// Leading lines compared when deciding whether a section repeats another.
const REPEAT_KEY_LINES: usize = 4;
/// Leading lines compared when checking a bridge candidate for uniqueness.
const BRIDGE_KEY_LINES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionType {
    Intro,
    Verse,
    PreChorus,
    Chorus,
    Bridge,
    Outro,
}

impl SectionType {
    /// Key the presentation layer maps to an icon.
    pub fn icon_key(self) -> &'static str {
        match self {
            SectionType::Intro => "sunrise",
            SectionType::Verse => "mic",
            SectionType::PreChorus => "trending-up",
            SectionType::Chorus => "star",
            SectionType::Bridge => "shuffle",
            SectionType::Outro => "sunset",
        }
    }

    /// Relative intensity used to pick move difficulty for a section.
    pub fn energy(self) -> f64 {
        match self {
            SectionType::Intro => 0.4,
            SectionType::Verse => 0.5,
            SectionType::PreChorus => 0.7,
            SectionType::Chorus => 0.9,
            SectionType::Bridge => 0.75,
            SectionType::Outro => 0.3,
        }
    }

    fn fixed_label(self) -> &'static str {
        match self {
            SectionType::Intro => "INTRO",
            SectionType::Verse => "VERSE",
            SectionType::PreChorus => "PRE-CHORUS",
            SectionType::Chorus => "CHORUS",
            SectionType::Bridge => "BRIDGE",
            SectionType::Outro => "OUTRO",
        }
    }
}

/// A labelled region of the lyric timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    #[serde(rename = "type")]
    pub kind: SectionType,
    pub label: String,
    pub start: f64,
    pub end: f64,
    /// 0 for the first occurrence, 1, 2... for repeats.
    #[serde(default)]
    pub occurrence_index: usize,
    /// Earlier section whose moves a repeat should reuse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_of: Option<usize>,
    #[serde(default)]
    pub line_count: usize,
}

impl Section {
    pub fn is_repeat(&self) -> bool {
        self.occurrence_index > 0
    }
}

/// Per-line result of repetition detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineTag {
    pub normalized: String,
    pub repeated: bool,
    /// Provisional type before section refinement: chorus or verse.
    pub kind: SectionType,
    pub section_index: usize,
}

/// Energy level over one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyPoint {
    pub start: f64,
    pub end: f64,
    pub energy: f64,
    #[serde(rename = "type")]
    pub kind: SectionType,
    pub label: String,
}

/// Output of [`StructureSegmenter::segment`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segmentation {
    pub sections: Vec<Section>,
    pub line_tags: Vec<LineTag>,
    /// Original section index mapped to the sections that repeat it.
    pub repeated_sections: BTreeMap<usize, Vec<usize>>,
}

impl Segmentation {
    /// Section index for each lyric line, in line order.
    pub fn line_sections(&self) -> Vec<usize> {
        self.line_tags.iter().map(|tag| tag.section_index).collect()
    }

    pub fn energy_map(&self) -> Vec<EnergyPoint> {
        self.sections
            .iter()
            .map(|section| EnergyPoint {
                start: section.start,
                end: section.end,
                energy: section.kind.energy(),
                kind: section.kind,
                label: section.label.clone(),
            })
            .collect()
    }
}

/// Sections of one song with a lookup index.
#[derive(Debug, Clone)]
pub struct SectionTrack {
    sections: Vec<Section>,
    index: TimeIndex,
}

impl SectionTrack {
    /// Sections must be sorted, non-empty and non-overlapping.
    pub fn new(sections: Vec<Section>) -> Result<Self> {
        let index = TimeIndex::closed(sections.iter().map(|s| (s.start, s.end)))?;
        Ok(Self { sections, index })
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn get(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn lookup(&self, t: f64) -> Lookup {
        self.index.lookup(t)
    }
}

#[derive(Debug, Clone)]
struct Group {
    kind: SectionType,
    first: usize,
    last: usize,
}

impl Group {
    fn line_count(&self) -> usize {
        self.last - self.first + 1
    }

    /// Up to `limit` leading normalized lines of the group.
    fn leading<'a>(&self, normalized: &'a [String], limit: usize) -> &'a [String] {
        let last = self.last.min(self.first + limit.max(1) - 1);
        &normalized[self.first..=last]
    }

    /// Identity of the leading lines, one entry per line.
    fn key(&self, normalized: &[String], limit: usize) -> String {
        self.leading(normalized, limit).join("\n")
    }
}

/// Clusters timed lyric lines into labelled sections.
#[derive(Debug, Clone, Default)]
pub struct StructureSegmenter {
    config: StructureConfig,
}

impl StructureSegmenter {
    pub fn new(config: StructureConfig) -> Self {
        Self { config }
    }

    /// Segments `segments`, which must be sorted and non-overlapping.
    /// `track_duration` enables the outro rule; without it no outro is labelled.
    pub fn segment(&self, segments: &[LyricSegment], track_duration: Option<f64>) -> Segmentation {
        if segments.is_empty() {
            return Segmentation::default();
        }

        let normalized: Vec<String> = segments
            .iter()
            .map(|seg| lyrics::normalize(&seg.text))
            .collect();
        let repeated = self.detect_repeats(&normalized);

        let mut groups = self.group_lines(segments, &repeated);
        self.refine(&mut groups, segments, &normalized, track_duration);

        let mut line_tags = Vec::with_capacity(segments.len());
        for (section_index, group) in groups.iter().enumerate() {
            for line in group.first..=group.last {
                line_tags.push(LineTag {
                    normalized: normalized[line].clone(),
                    repeated: repeated[line],
                    kind: if repeated[line] {
                        SectionType::Chorus
                    } else {
                        SectionType::Verse
                    },
                    section_index,
                });
            }
        }

        let (sections, repeated_sections) = build_sections(&groups, segments, &normalized);

        info!(
            lines = segments.len(),
            sections = sections.len(),
            repeats = repeated_sections.values().map(Vec::len).sum::<usize>(),
            "segmented song structure"
        );
        for section in &sections {
            debug!(
                label = %section.label,
                start = section.start,
                end = section.end,
                lines = section.line_count,
                repeat_of = ?section.repeat_of,
                "section"
            );
        }

        Segmentation {
            sections,
            line_tags,
            repeated_sections,
        }
    }

    fn detect_repeats(&self, normalized: &[String]) -> Vec<bool> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for text in normalized {
            *counts.entry(text.as_str()).or_default() += 1;
        }

        normalized
            .iter()
            .map(|text| {
                !text.is_empty()
                    && text.chars().count() >= self.config.min_repeat_chars
                    && counts.get(text.as_str()).copied().unwrap_or(0) >= 2
            })
            .collect()
    }

    fn group_lines(&self, segments: &[LyricSegment], repeated: &[bool]) -> Vec<Group> {
        let mut groups: Vec<Group> = Vec::new();

        for (line, is_repeated) in repeated.iter().enumerate() {
            let kind = if *is_repeated {
                SectionType::Chorus
            } else {
                SectionType::Verse
            };

            let breaks_on_gap = line > 0
                && self
                    .config
                    .section_break_gap_seconds
                    .is_some_and(|limit| segments[line].start - segments[line - 1].end > limit);

            match groups.last_mut() {
                Some(group) if group.kind == kind && !breaks_on_gap => group.last = line,
                _ => groups.push(Group {
                    kind,
                    first: line,
                    last: line,
                }),
            }
        }

        groups
    }

    fn refine(
        &self,
        groups: &mut [Group],
        segments: &[LyricSegment],
        normalized: &[String],
        track_duration: Option<f64>,
    ) {
        let first_start = segments[0].start;
        let last_end = segments[segments.len() - 1].end;
        let span = last_end - first_start;
        let has_chorus = groups.iter().any(|group| group.kind == SectionType::Chorus);

        if has_chorus {
            for i in 0..groups.len() {
                if groups[i].kind != SectionType::Verse {
                    continue;
                }

                let before_chorus = groups
                    .get(i + 1)
                    .is_some_and(|next| next.kind == SectionType::Chorus);
                if before_chorus && groups[i].line_count() <= self.config.pre_chorus_max_lines {
                    groups[i].kind = SectionType::PreChorus;
                    continue;
                }

                let position = if span > 0.0 {
                    (segments[groups[i].first].start - first_start) / span
                } else {
                    0.0
                };
                if position > self.config.bridge_start_fraction
                    && self.is_unique(groups, i, normalized)
                {
                    groups[i].kind = SectionType::Bridge;
                }
            }
        }

        if groups.len() < 2 {
            return;
        }

        let first = &mut groups[0];
        if first.kind == SectionType::Verse
            && first.line_count() <= self.config.intro_max_lines
            && first_start >= self.config.intro_lead_seconds
        {
            first.kind = SectionType::Intro;
        }

        let last_index = groups.len() - 1;
        let last = &mut groups[last_index];
        if matches!(last.kind, SectionType::Verse | SectionType::Bridge)
            && last.line_count() <= self.config.outro_max_lines
            && track_duration
                .is_some_and(|duration| duration - last_end >= self.config.outro_tail_seconds)
        {
            last.kind = SectionType::Outro;
        }
    }

    fn is_unique(&self, groups: &[Group], index: usize, normalized: &[String]) -> bool {
        let content = groups[index].leading(normalized, BRIDGE_KEY_LINES);
        groups.iter().enumerate().all(|(other, group)| {
            other == index
                || line_similarity(content, group.leading(normalized, BRIDGE_KEY_LINES))
                    <= self.config.bridge_uniqueness_similarity
        })
    }
}

/// Mean word similarity of paired lines, counting unpaired lines as 0.
fn line_similarity(a: &[String], b: &[String]) -> f64 {
    let len = a.len().max(b.len());
    if len == 0 {
        return 0.0;
    }
    let total: f64 = a.iter().zip(b).map(|(x, y)| lyrics::similarity(x, y)).sum();
    total / len as f64
}

fn build_sections(
    groups: &[Group],
    segments: &[LyricSegment],
    normalized: &[String],
) -> (Vec<Section>, BTreeMap<usize, Vec<usize>>) {
    let mut sections = Vec::with_capacity(groups.len());
    let mut repeated_sections: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut first_by_key: HashMap<String, usize> = HashMap::new();
    let mut seen_by_key: HashMap<String, usize> = HashMap::new();
    let mut first_chorus: Option<usize> = None;
    let mut chorus_count = 0;
    let mut verse_count = 0;

    for (index, group) in groups.iter().enumerate() {
        let key = group.key(normalized, REPEAT_KEY_LINES);
        let same_content = first_by_key.get(&key).copied();
        let seen = seen_by_key.entry(key.clone()).or_insert(0);

        let (occurrence_index, repeat_of) = match group.kind {
            SectionType::Chorus => {
                let occurrence = chorus_count;
                chorus_count += 1;
                let repeat_of = same_content.or(first_chorus);
                first_chorus.get_or_insert(index);
                (occurrence, repeat_of)
            }
            _ => (*seen, same_content),
        };
        *seen += 1;
        first_by_key.entry(key).or_insert(index);

        if let Some(original) = repeat_of {
            repeated_sections.entry(original).or_default().push(index);
        }

        let label = match group.kind {
            SectionType::Verse => {
                verse_count += 1;
                format!("VERSE {verse_count}")
            }
            SectionType::Chorus if occurrence_index > 0 => "CHORUS (repeat)".to_string(),
            kind => kind.fixed_label().to_string(),
        };

        sections.push(Section {
            kind: group.kind,
            label,
            start: segments[group.first].start,
            end: segments[group.last].end,
            occurrence_index,
            repeat_of,
            line_count: group.line_count(),
        });
    }

    (sections, repeated_sections)
}
