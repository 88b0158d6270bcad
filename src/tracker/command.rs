//! The tracker's command grammar: one line per command, tokens split on
//! ASCII space, dispatched on `tokens[0]`. Parsed once at the connection
//! boundary into a tagged sum, per the design notes — the rest of the
//! tracker never touches raw strings again.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateUser {
        user_id: String,
        password: String,
    },
    Login {
        user_id: String,
        password: String,
        endpoint: String,
    },
    Logout,
    CreateGroup {
        group_id: String,
    },
    JoinGroup {
        group_id: String,
    },
    LeaveGroup {
        group_id: String,
    },
    ListRequests {
        group_id: String,
    },
    AcceptRequest {
        group_id: String,
        user_id: String,
    },
    ListGroups,
    ListFiles {
        group_id: String,
    },
    UploadFile {
        local_path: String,
        group_id: String,
        whole_hash: String,
        size: String,
        piece_count: String,
    },
    DownloadFile {
        group_id: String,
        filename: String,
        target_path: String,
    },
    GetRarestPieceInfo {
        group_id: String,
        filename: String,
    },
    UpdatePieceInfo {
        group_id: String,
        filename: String,
        local_path: String,
        piece_number: String,
    },
    StopShare {
        group_id: String,
        filename: String,
    },
    Quit,
    /// Too few arguments for a recognized command name.
    Invalid {
        name: String,
    },
    Unknown {
        name: String,
    },
}

pub fn parse(line: &str) -> Command {
    let tokens: Vec<&str> = line.split(' ').filter(|t| !t.is_empty()).collect();
    if tokens.is_empty() {
        return Command::Unknown {
            name: String::new(),
        };
    }

    let name = tokens[0];
    let args = &tokens[1..];

    macro_rules! need {
        ($n:expr) => {
            if args.len() < $n {
                return Command::Invalid {
                    name: name.to_string(),
                };
            }
        };
    }

    match name {
        "create_user" => {
            need!(2);
            Command::CreateUser {
                user_id: args[0].to_string(),
                password: args[1].to_string(),
            }
        }
        "login" => {
            need!(3);
            Command::Login {
                user_id: args[0].to_string(),
                password: args[1].to_string(),
                endpoint: args[2].to_string(),
            }
        }
        "logout" => Command::Logout,
        "create_group" => {
            need!(1);
            Command::CreateGroup {
                group_id: args[0].to_string(),
            }
        }
        "join_group" => {
            need!(1);
            Command::JoinGroup {
                group_id: args[0].to_string(),
            }
        }
        "leave_group" => {
            need!(1);
            Command::LeaveGroup {
                group_id: args[0].to_string(),
            }
        }
        "list_requests" => {
            need!(1);
            Command::ListRequests {
                group_id: args[0].to_string(),
            }
        }
        "accept_request" => {
            need!(2);
            Command::AcceptRequest {
                group_id: args[0].to_string(),
                user_id: args[1].to_string(),
            }
        }
        "list_groups" => Command::ListGroups,
        "list_files" => {
            need!(1);
            Command::ListFiles {
                group_id: args[0].to_string(),
            }
        }
        "upload_file" => {
            need!(5);
            Command::UploadFile {
                local_path: args[0].to_string(),
                group_id: args[1].to_string(),
                whole_hash: args[2].to_string(),
                size: args[3].to_string(),
                piece_count: args[4].to_string(),
            }
        }
        "download_file" => {
            need!(3);
            Command::DownloadFile {
                group_id: args[0].to_string(),
                filename: args[1].to_string(),
                target_path: args[2].to_string(),
            }
        }
        "get_rarest_piece_info" => {
            need!(2);
            Command::GetRarestPieceInfo {
                group_id: args[0].to_string(),
                filename: args[1].to_string(),
            }
        }
        "update_piece_info" => {
            need!(4);
            Command::UpdatePieceInfo {
                group_id: args[0].to_string(),
                filename: args[1].to_string(),
                local_path: args[2].to_string(),
                piece_number: args[3].to_string(),
            }
        }
        "stop_share" => {
            need!(2);
            Command::StopShare {
                group_id: args[0].to_string(),
                filename: args[1].to_string(),
            }
        }
        "quit" => Command::Quit,
        other => Command::Unknown {
            name: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_login() {
        let cmd = parse("login alice pw 1.2.3.4:9000");
        assert_eq!(
            cmd,
            Command::Login {
                user_id: "alice".into(),
                password: "pw".into(),
                endpoint: "1.2.3.4:9000".into(),
            }
        );
    }

    #[test]
    fn too_few_args_is_invalid_not_panic() {
        assert_eq!(
            parse("login alice"),
            Command::Invalid {
                name: "login".into()
            }
        );
    }

    #[test]
    fn unrecognized_name_is_unknown() {
        assert_eq!(
            parse("frobnicate x y"),
            Command::Unknown {
                name: "frobnicate".into()
            }
        );
    }

    #[test]
    fn blank_line_is_unknown() {
        assert_eq!(
            parse(""),
            Command::Unknown {
                name: String::new()
            }
        );
    }
}
