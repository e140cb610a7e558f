/// One module per instrument of an experiment. Each loads its files into the
/// shared [`Table`](crate::data::model::Table) shape on experiment time.

pub mod images;
pub mod mirex;
pub mod series;
pub mod simulation;
pub mod temparray;
