//! Tracker reply values. Command handling builds one of these; the wire
//! form is joined at the edge, per the design notes, rather than threading
//! `String` formatting through the command logic.

use crate::endpoint::Endpoint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// A single human-readable line, used for every status/error reply.
    Text(String),
    /// Newline-joined lines, used by `list_groups`/`list_files`/`list_requests`.
    Lines(Vec<String>),
    /// `download_file`'s metadata block.
    DownloadMeta {
        group_id: String,
        filename: String,
        size: u64,
        whole_hash: String,
        piece_hashes: Vec<String>,
    },
    /// `get_rarest_piece_info`'s descriptor, or `None` when the caller
    /// already has every piece.
    RarestPiece(Option<RarestPiece>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RarestPiece {
    /// 1-indexed, as it appears on the wire.
    pub piece_number: usize,
    pub providers: Vec<(Endpoint, String)>,
}

impl Response {
    pub fn text(s: impl Into<String>) -> Response {
        Response::Text(s.into())
    }

    pub fn into_wire(self) -> String {
        match self {
            Response::Text(s) => s,
            Response::Lines(lines) => lines.join("\n"),
            Response::DownloadMeta {
                group_id,
                filename,
                size,
                whole_hash,
                piece_hashes,
            } => {
                let mut lines = vec![
                    "Success".to_string(),
                    format!(
                        "{} {} {} {} {}",
                        group_id,
                        filename,
                        size,
                        whole_hash,
                        piece_hashes.len()
                    ),
                ];
                lines.extend(piece_hashes);
                lines.join("\n")
            }
            Response::RarestPiece(None) => String::new(),
            Response::RarestPiece(Some(rp)) => {
                let mut lines = vec!["Success".to_string(), rp.piece_number.to_string()];
                lines.extend(
                    rp.providers
                        .into_iter()
                        .map(|(endpoint, path)| format!("{}:{}", endpoint, path)),
                );
                lines.join("\n")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_meta_formats_per_spec() {
        let resp = Response::DownloadMeta {
            group_id: "g".into(),
            filename: "hello.bin".into(),
            size: 600_000,
            whole_hash: "a".repeat(40),
            piece_hashes: vec!["b".repeat(40), "c".repeat(40)],
        };
        let wire = resp.into_wire();
        let mut lines = wire.lines();
        assert_eq!(lines.next().unwrap(), "Success");
        assert_eq!(
            lines.next().unwrap(),
            format!("g hello.bin 600000 {} 2", "a".repeat(40))
        );
        assert_eq!(lines.next().unwrap(), "b".repeat(40));
        assert_eq!(lines.next().unwrap(), "c".repeat(40));
    }

    #[test]
    fn rarest_piece_none_is_empty_string() {
        assert_eq!(Response::RarestPiece(None).into_wire(), "");
    }

    #[test]
    fn rarest_piece_some_formats_per_spec() {
        let endpoint: Endpoint = "1.2.3.4:9".parse().unwrap();
        let resp = Response::RarestPiece(Some(RarestPiece {
            piece_number: 3,
            providers: vec![(endpoint, "/tmp/f.bin".to_string())],
        }));
        assert_eq!(resp.into_wire(), "Success\n3\n1.2.3.4:9:/tmp/f.bin");
    }
}
