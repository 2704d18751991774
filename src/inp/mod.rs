//! INP text-format adapter: reading a project from an input file and writing
//! the network back out in canonical section form.

pub(crate) mod parser;
pub(crate) mod writer;

/// Section headings recognized in an INP file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SectionKind {
    Title,
    Junctions,
    Reservoirs,
    Tanks,
    Pipes,
    Pumps,
    Valves,
    Tags,
    Demands,
    Status,
    Patterns,
    Curves,
    Controls,
    Rules,
    Energy,
    Emitters,
    Quality,
    Sources,
    Reactions,
    Mixing,
    Times,
    Report,
    Options,
    Coordinates,
    Vertices,
    Labels,
    Backdrop,
    End,
}

pub(crate) fn section_kind(heading: &str) -> Option<SectionKind> {
    let upper = heading.to_uppercase();
    let name = upper.trim_start_matches('[').trim_end_matches(']');
    Some(match name {
        "TITLE" => SectionKind::Title,
        "JUNCTIONS" => SectionKind::Junctions,
        "RESERVOIRS" => SectionKind::Reservoirs,
        "TANKS" => SectionKind::Tanks,
        "PIPES" => SectionKind::Pipes,
        "PUMPS" => SectionKind::Pumps,
        "VALVES" => SectionKind::Valves,
        "TAGS" => SectionKind::Tags,
        "DEMANDS" => SectionKind::Demands,
        "STATUS" => SectionKind::Status,
        "PATTERNS" => SectionKind::Patterns,
        "CURVES" => SectionKind::Curves,
        "CONTROLS" => SectionKind::Controls,
        "RULES" => SectionKind::Rules,
        "ENERGY" => SectionKind::Energy,
        "EMITTERS" => SectionKind::Emitters,
        "QUALITY" => SectionKind::Quality,
        "SOURCES" => SectionKind::Sources,
        "REACTIONS" => SectionKind::Reactions,
        "MIXING" => SectionKind::Mixing,
        "TIMES" => SectionKind::Times,
        "REPORT" => SectionKind::Report,
        "OPTIONS" => SectionKind::Options,
        "COORDINATES" => SectionKind::Coordinates,
        "VERTICES" => SectionKind::Vertices,
        "LABELS" => SectionKind::Labels,
        "BACKDROP" => SectionKind::Backdrop,
        "END" => SectionKind::End,
        _ => return None,
    })
}
