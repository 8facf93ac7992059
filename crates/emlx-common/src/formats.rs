//! DataONE format identifiers for data files
//!
//! The member node rejects objects whose `formatId` it does not know, so
//! anything outside this table is sent as `application/octet-stream`.

use std::path::Path;

/// Format of an EML 2.2.0 metadata document
pub const EML_FORMAT_ID: &str = "https://eml.ecoinformatics.org/eml-2.2.0";

/// Format of an OAI-ORE resource map
pub const RESOURCE_MAP_FORMAT_ID: &str = "http://www.openarchives.org/ore/terms";

/// Fallback format for unknown extensions
pub const OCTET_STREAM: &str = "application/octet-stream";

const FORMATS: &[(&str, &str)] = &[
    ("xls", "application/vnd.ms-excel"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("doc", "application/msword"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("ppt", "application/vnd.ms-powerpoint"),
    ("pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
    ("pdf", "application/pdf"),
    ("txt", "text/plain"),
    ("zip", "application/zip"),
    ("ttl", "text/turtle"),
    ("md", "text/markdown"),
    ("rmd", "text/x-rmarkdown"),
    ("csv", "text/csv"),
    ("bmp", "image/bmp"),
    ("gif", "image/gif"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("jp2", "image/jp2"),
    ("png", "image/png"),
    ("tif", "image/geotiff"),
    ("svg", "image/svg+xml"),
    ("nc", "netCDF-4"),
    ("py", "application/x-python"),
    ("hdf", "application/x-hdf"),
    ("hdf5", "application/x-hdf5"),
    ("tab", "text/plain"),
    ("gz", "application/x-gzip"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("xml", "text/xml"),
    ("ps", "application/postscript"),
    ("tsv", "text/tsv"),
    ("rtf", "application/rtf"),
    ("mp4", "video/mp4"),
    ("r", "application/R"),
    ("rar", "application/x-rar-compressed"),
    ("fasta", "application/x-fasta"),
    ("fastq", "application/x-fasta"),
    ("fas", "application/x-fasta"),
    ("gpx", "application/gpx+xml"),
];

/// Format identifier for a file, chosen by its extension
pub fn format_id_for(path: impl AsRef<Path>) -> &'static str {
    let Some(ext) = path.as_ref().extension().and_then(|e| e.to_str()) else {
        return OCTET_STREAM;
    };
    let ext = ext.to_ascii_lowercase();
    FORMATS
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, format)| *format)
        .unwrap_or(OCTET_STREAM)
}
