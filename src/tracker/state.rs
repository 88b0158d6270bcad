//! The tracker's authoritative directory: users, groups, file entries and
//! per-piece availability. All mutation and all reads go through
//! [`TrackerState`], which serializes access behind a single coarse mutex —
//! the design notes call for an owning state handle accessed through a
//! mutex, with operations as plain functions taking a reference to it,
//! rather than the original's bare global maps.

use crate::endpoint::Endpoint;
use crate::tracker::command::Command;
use crate::tracker::response::{RarestPiece, Response};
use crate::tracker::session::Session;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

#[derive(Debug)]
pub struct FileEntry {
    pub size: u64,
    pub whole_hash: String,
    pub piece_hashes: Vec<String>,
    /// One set of providers per piece, 0-indexed internally.
    pub availability: Vec<BTreeSet<Endpoint>>,
    /// Per-provider local path to the file, keyed by endpoint.
    pub providers: HashMap<Endpoint, String>,
}

impl FileEntry {
    fn new(whole_hash: String, size: u64, piece_count: usize, uploader: Endpoint, path: String) -> Self {
        let mut providers = HashMap::new();
        providers.insert(uploader, path);
        FileEntry {
            size,
            whole_hash,
            piece_hashes: Vec::with_capacity(piece_count),
            availability: vec![BTreeSet::from([uploader]); piece_count],
            providers,
        }
    }

    /// Scans pieces in index order for the rarest one the caller lacks.
    /// Improvement is strict (`<`), so ties resolve to the first piece
    /// encountered at the running minimum — REQUIRED by spec, not merely
    /// incidental to the scan order.
    fn rarest_piece(&self, caller: Endpoint) -> Option<(usize, &BTreeSet<Endpoint>)> {
        let mut best: Option<(usize, usize)> = None;
        for (i, providers) in self.availability.iter().enumerate() {
            if providers.contains(&caller) {
                continue;
            }
            let count = providers.len();
            match best {
                Some((_, best_count)) if count < best_count => best = Some((i, count)),
                None => best = Some((i, count)),
                _ => {}
            }
        }
        best.map(|(i, _)| (i, &self.availability[i]))
    }

    fn stop_share(&mut self, endpoint: Endpoint) {
        for providers in self.availability.iter_mut() {
            providers.remove(&endpoint);
        }
        self.providers.remove(&endpoint);
    }

    fn update_piece_info(&mut self, piece_index: usize, endpoint: Endpoint, local_path: String) -> bool {
        if piece_index >= self.availability.len() {
            return false;
        }
        self.availability[piece_index].insert(endpoint);
        self.providers.insert(endpoint, local_path);
        true
    }
}

#[derive(Debug, Default)]
pub struct Group {
    pub owner: String,
    pub members: BTreeSet<String>,
    pub pending: BTreeSet<String>,
    pub files: HashMap<String, FileEntry>,
}

#[derive(Default)]
struct Directory {
    users: HashMap<String, String>,
    groups: HashMap<String, Group>,
}

impl Directory {
    fn is_registered(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    fn is_member(&self, group_id: &str, user_id: &str) -> bool {
        self.groups
            .get(group_id)
            .is_some_and(|g| g.members.contains(user_id))
    }

    /// Removes `endpoint` from every piece-availability set of every file
    /// in every group the user belongs to. Used both by the explicit
    /// `logout` command and by connection teardown on EOF/`quit`.
    fn scrub_endpoint(&mut self, user_id: &str, endpoint: Endpoint) {
        for group in self.groups.values_mut() {
            if !group.members.contains(user_id) {
                continue;
            }
            for file in group.files.values_mut() {
                file.stop_share(endpoint);
            }
        }
    }
}

pub struct TrackerState {
    directory: Mutex<Directory>,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackerState {
    pub fn new() -> Self {
        TrackerState {
            directory: Mutex::new(Directory::default()),
        }
    }

    /// Dispatches every command except `upload_file`'s hash-reading
    /// sub-protocol, which the connection handler drives directly because
    /// it spans multiple framed messages and must not hold the lock across
    /// network I/O.
    pub fn dispatch(&self, cmd: Command, session: &mut Session) -> Response {
        let mut dir = self.directory.lock().unwrap();
        match cmd {
            Command::CreateUser { user_id, password } => {
                if session.is_logged_in() {
                    return Response::text("already logged in");
                }
                if dir.is_registered(&user_id) {
                    return Response::text("user already exists");
                }
                dir.users.insert(user_id, password);
                Response::text("user created")
            }

            Command::Login {
                user_id,
                password,
                endpoint,
            } => {
                if session.is_logged_in() {
                    return Response::text("already logged in");
                }
                if !dir.is_registered(&user_id) {
                    return Response::text("Invalid user id");
                }
                if dir.users.get(&user_id).map(String::as_str) != Some(password.as_str()) {
                    return Response::text("Invalid password");
                }
                let endpoint = match endpoint.parse::<Endpoint>() {
                    Ok(e) => e,
                    Err(_) => return Response::text("invalid endpoint"),
                };
                session.bind(user_id, endpoint);
                Response::text("logged in")
            }

            Command::Logout => self.logout(&mut dir, session),

            Command::CreateGroup { group_id } => {
                let Some(user_id) = require_login(session) else {
                    return Response::text("login first");
                };
                if dir.groups.contains_key(&group_id) {
                    return Response::text("group already exists");
                }
                let mut group = Group {
                    owner: user_id.to_string(),
                    ..Default::default()
                };
                group.members.insert(user_id.to_string());
                dir.groups.insert(group_id, group);
                Response::text("group created")
            }

            Command::JoinGroup { group_id } => {
                let Some(user_id) = require_login(session) else {
                    return Response::text("login first");
                };
                let Some(group) = dir.groups.get_mut(&group_id) else {
                    return Response::text("group does not exist");
                };
                if group.members.contains(user_id) {
                    return Response::text("already a member");
                }
                if group.pending.contains(user_id) {
                    return Response::text("already requested");
                }
                group.pending.insert(user_id.to_string());
                Response::text("request sent")
            }

            Command::LeaveGroup { group_id } => {
                let Some(user_id) = require_login(session) else {
                    return Response::text("login first");
                };
                let user_id = user_id.to_string();
                let Some(group) = dir.groups.get_mut(&group_id) else {
                    return Response::text("group does not exist");
                };
                if !group.members.remove(&user_id) {
                    return Response::text("not a member");
                }
                if group.owner == user_id {
                    if let Some(next_owner) = group.members.iter().next().cloned() {
                        group.owner = next_owner;
                    }
                }
                if group.members.is_empty() {
                    dir.groups.remove(&group_id);
                    return Response::text("last member. deleting group");
                }
                Response::text("left group")
            }

            Command::ListRequests { group_id } => {
                let Some(user_id) = require_login(session) else {
                    return Response::text("login first");
                };
                let Some(group) = dir.groups.get(&group_id) else {
                    return Response::text("group does not exist");
                };
                if group.owner != user_id {
                    return Response::text("unauthorized");
                }
                Response::Lines(group.pending.iter().cloned().collect())
            }

            Command::AcceptRequest { group_id, user_id } => {
                let Some(caller) = require_login(session) else {
                    return Response::text("login first");
                };
                let caller = caller.to_string();
                if !dir.is_registered(&user_id) {
                    return Response::text("user does not exist");
                }
                let Some(group) = dir.groups.get_mut(&group_id) else {
                    return Response::text("group does not exist");
                };
                if group.owner != caller {
                    return Response::text("unauthorized");
                }
                if !group.pending.remove(&user_id) {
                    return Response::text("not requested");
                }
                group.members.insert(user_id);
                Response::text("request accepted")
            }

            Command::ListGroups => {
                if require_login(session).is_none() {
                    return Response::text("login first");
                }
                let mut lines: Vec<String> = dir
                    .groups
                    .iter()
                    .map(|(group_id, g)| format!("{}\t{}", group_id, g.owner))
                    .collect();
                lines.sort();
                Response::Lines(lines)
            }

            Command::ListFiles { group_id } => {
                let Some(user_id) = require_login(session) else {
                    return Response::text("login first");
                };
                let Some(group) = dir.groups.get(&group_id) else {
                    return Response::text("group does not exist");
                };
                if !group.members.contains(user_id) {
                    return Response::text("not a member of the group");
                }
                let mut lines: Vec<String> = group
                    .files
                    .iter()
                    .map(|(name, f)| format!("{}\t{}", name, f.size))
                    .collect();
                lines.sort();
                Response::Lines(lines)
            }

            Command::DownloadFile {
                group_id,
                filename,
                target_path: _,
            } => {
                if require_login(session).is_none() {
                    return Response::text("login first");
                }
                let Some(group) = dir.groups.get(&group_id) else {
                    return Response::text("group does not exist");
                };
                let Some(file) = group.files.get(&filename) else {
                    return Response::text("file does not exist");
                };
                Response::DownloadMeta {
                    group_id,
                    filename,
                    size: file.size,
                    whole_hash: file.whole_hash.clone(),
                    piece_hashes: file.piece_hashes.clone(),
                }
            }

            Command::GetRarestPieceInfo { group_id, filename } => {
                let Some(user_id) = require_login(session) else {
                    return Response::text("login first");
                };
                let endpoint = session.endpoint().unwrap();
                let Some(group) = dir.groups.get(&group_id) else {
                    return Response::text("group does not exist");
                };
                if !group.members.contains(user_id) {
                    return Response::text("not a member of the group");
                }
                let Some(file) = group.files.get(&filename) else {
                    return Response::text("file does not exist");
                };
                let rarest = file.rarest_piece(endpoint).map(|(index, providers)| RarestPiece {
                    piece_number: index + 1,
                    providers: providers
                        .iter()
                        .map(|ep| (*ep, file.providers.get(ep).cloned().unwrap_or_default()))
                        .collect(),
                });
                Response::RarestPiece(rarest)
            }

            Command::UpdatePieceInfo {
                group_id,
                filename,
                local_path,
                piece_number,
            } => {
                if require_login(session).is_none() {
                    return Response::text("login first");
                }
                let endpoint = session.endpoint().unwrap();
                let Ok(piece_number) = piece_number.parse::<usize>() else {
                    return Response::text("INVALID INPUT; piece number should be positive");
                };
                if piece_number == 0 {
                    return Response::text("INVALID INPUT; piece number should be positive");
                }
                let Some(group) = dir.groups.get_mut(&group_id) else {
                    return Response::text("group does not exist");
                };
                let Some(file) = group.files.get_mut(&filename) else {
                    return Response::text("file does not exist");
                };
                if !file.update_piece_info(piece_number - 1, endpoint, local_path) {
                    return Response::text("invalid piece number");
                }
                Response::text("updated")
            }

            Command::StopShare { group_id, filename } => {
                if require_login(session).is_none() {
                    return Response::text("not logged in");
                }
                let endpoint = session.endpoint().unwrap();
                let Some(group) = dir.groups.get_mut(&group_id) else {
                    return Response::text("group does not exist");
                };
                let Some(file) = group.files.get_mut(&filename) else {
                    return Response::text("file does not exist");
                };
                file.stop_share(endpoint);
                Response::text("stopped sharing")
            }

            Command::UploadFile { .. } => {
                // Driven directly by the connection handler; see
                // `check_upload_preconditions`/`finish_upload` below.
                Response::text("INVALID COMMAND")
            }

            Command::Quit => Response::text(""),
            Command::Invalid { name } => Response::text(format!("INVALID COMMAND: {}", name)),
            Command::Unknown { name } => Response::text(format!("unknown command: {}", name)),
        }
    }

    fn logout(&self, dir: &mut Directory, session: &mut Session) -> Response {
        match self.teardown(dir, session) {
            Some(_) => Response::text("logged out"),
            None => Response::text("not logged in"),
        }
    }

    /// Tears down a session on explicit `logout`, `quit`, or disconnect:
    /// scrubs the endpoint from every file the user can see, then clears
    /// the session. Idempotent — a session with no identity is a no-op.
    pub fn teardown_session(&self, session: &mut Session) {
        let mut dir = self.directory.lock().unwrap();
        self.teardown(&mut dir, session);
    }

    fn teardown(&self, dir: &mut Directory, session: &mut Session) -> Option<(String, Endpoint)> {
        let identity = session.clear()?;
        dir.scrub_endpoint(&identity.0, identity.1);
        Some(identity)
    }

    /// Validates every precondition of `upload_file` short of actually
    /// having the hashes, without mutating any shared state. Returns the
    /// basename file name and uploader endpoint on success.
    pub fn check_upload_preconditions(
        &self,
        session: &Session,
        local_path: &str,
        group_id: &str,
    ) -> Result<(String, Endpoint), String> {
        let Some(user_id) = session.user_id() else {
            return Err("login first".to_string());
        };
        let endpoint = session.endpoint().unwrap();
        let dir = self.directory.lock().unwrap();
        let Some(group) = dir.groups.get(group_id) else {
            return Err("group does not exist".to_string());
        };
        if !group.members.contains(user_id) {
            return Err("not a member of the group".to_string());
        }
        let file_name = basename(local_path);
        if group.files.contains_key(&file_name) {
            return Err("file with same name already exists".to_string());
        }
        Ok((file_name, endpoint))
    }

    /// Inserts the uploaded file entry once all piece hashes have been
    /// received. Re-validates preconditions since state may have changed
    /// while the handler was reading hash messages off the wire.
    #[allow(clippy::too_many_arguments)]
    pub fn finish_upload(
        &self,
        group_id: &str,
        file_name: String,
        whole_hash: String,
        size: u64,
        piece_hashes: Vec<String>,
        local_path: String,
        uploader: Endpoint,
        uploader_id: &str,
    ) -> Result<(), String> {
        let mut dir = self.directory.lock().unwrap();
        let Some(group) = dir.groups.get_mut(group_id) else {
            return Err("group does not exist".to_string());
        };
        if !group.members.contains(uploader_id) {
            return Err("not a member of the group".to_string());
        }
        if group.files.contains_key(&file_name) {
            return Err("file with same name already exists".to_string());
        }
        let piece_count = piece_hashes.len();
        let mut entry = FileEntry::new(whole_hash, size, piece_count, uploader, local_path);
        entry.piece_hashes = piece_hashes;
        group.files.insert(file_name, entry);
        Ok(())
    }
}

fn require_login(session: &Session) -> Option<&str> {
    session.user_id()
}

fn basename(path: &str) -> String {
    path.rsplit(['/', '\\']).next().unwrap_or(path).to_string()
}
