use time::{Duration, OffsetDateTime};

/// 1ウィンドウ内に許可するリセットリクエスト数
pub const MAX_RESET_ATTEMPTS: i32 = 3;
/// スロットリングウィンドウの長さ（分）
pub const RESET_WINDOW_MINUTES: i64 = 5;

/// レート制限の判定結果
#[derive(Debug, PartialEq, Eq)]
pub enum RateDecision {
    /// リクエスト許可
    ///
    /// `window_lapsed` が true の場合、前回のウィンドウは経過済みで、
    /// ワークフローは試行記録の前にカウンターをゼロに戻す
    Allowed { window_lapsed: bool },
    /// リクエスト拒否
    Denied {
        /// 次のリクエストが許可されるまでの分数（最小1）
        retry_after_minutes: i64,
    },
}

/// リセットリクエストを許可するか判定する
///
/// 純粋な判定のみで副作用はない。カウンターの更新はワークフロー側が行う。
/// NULL のフィールド（一度もリセットしていないユーザー）はここで 0/未試行 として扱う。
///
/// ウィンドウ境界は厳密な大なり比較: ちょうど5分経過はまだウィンドウ内。
pub fn check(
    attempts: Option<i32>,
    last_attempt: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> RateDecision {
    let attempts = attempts.unwrap_or(0);

    // 過去に試行がなければ無条件で許可
    let last_attempt = match last_attempt {
        Some(t) => t,
        None => return RateDecision::Allowed {
            window_lapsed: false,
        },
    };

    let window = Duration::minutes(RESET_WINDOW_MINUTES);
    let elapsed = now - last_attempt;

    // ウィンドウ経過済み → 許可（カウンターは記録時にゼロへ）
    if elapsed > window {
        return RateDecision::Allowed {
            window_lapsed: true,
        };
    }

    // ウィンドウ内で上限未満 → 許可
    if attempts < MAX_RESET_ATTEMPTS {
        return RateDecision::Allowed {
            window_lapsed: false,
        };
    }

    // 上限到達 → 拒否。残り時間を分に切り上げて返す
    let remaining = (last_attempt + window) - now;
    let retry_after_minutes = (remaining.whole_seconds() / 60 + 1).max(1);

    RateDecision::Denied {
        retry_after_minutes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn test_first_request_always_allowed() {
        let decision = check(None, None, now());
        assert_eq!(
            decision,
            RateDecision::Allowed {
                window_lapsed: false
            }
        );
    }

    #[test]
    fn test_null_attempts_with_recent_timestamp_allowed() {
        // DB上 attempts が NULL でもタイムスタンプだけ残っているケース
        let decision = check(None, Some(now() - Duration::minutes(1)), now());
        assert_eq!(
            decision,
            RateDecision::Allowed {
                window_lapsed: false
            }
        );
    }

    #[test]
    fn test_under_limit_within_window_allowed() {
        for attempts in 0..MAX_RESET_ATTEMPTS {
            let decision = check(Some(attempts), Some(now() - Duration::minutes(1)), now());
            assert_eq!(
                decision,
                RateDecision::Allowed {
                    window_lapsed: false
                },
                "attempts={} は許可されるべき",
                attempts
            );
        }
    }

    #[test]
    fn test_fourth_request_within_window_denied() {
        let decision = check(Some(3), Some(now() - Duration::minutes(1)), now());
        match decision {
            RateDecision::Denied {
                retry_after_minutes,
            } => assert!(retry_after_minutes >= 1),
            _ => panic!("4回目は拒否されるべき: {:?}", decision),
        }
    }

    #[test]
    fn test_window_lapsed_resets() {
        // 5分+1秒経過 → ウィンドウ経過済みとして許可
        let decision = check(
            Some(3),
            Some(now() - Duration::minutes(5) - Duration::seconds(1)),
            now(),
        );
        assert_eq!(decision, RateDecision::Allowed { window_lapsed: true });
    }

    #[test]
    fn test_exact_window_boundary_still_inside() {
        // ちょうど5分経過はまだウィンドウ内（厳密な大なり比較）
        let decision = check(Some(3), Some(now() - Duration::minutes(5)), now());
        assert_eq!(
            decision,
            RateDecision::Denied {
                retry_after_minutes: 1
            }
        );
    }

    #[test]
    fn test_exact_window_boundary_under_limit_allowed() {
        // 境界上でも上限未満なら許可（カウンターリセットはまだ）
        let decision = check(Some(2), Some(now() - Duration::minutes(5)), now());
        assert_eq!(
            decision,
            RateDecision::Allowed {
                window_lapsed: false
            }
        );
    }

    #[test]
    fn test_retry_after_reflects_remaining_time() {
        // 1分経過時点で拒否 → 残り約4分 → 5分のヒント
        let decision = check(Some(3), Some(now() - Duration::minutes(1)), now());
        assert_eq!(
            decision,
            RateDecision::Denied {
                retry_after_minutes: 5
            }
        );
    }
}
