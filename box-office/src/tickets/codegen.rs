//! 票码与 QR 负载生成
//!
//! 票码格式 `XXXX-XXXX-XXXX`，字母表去掉了 `0/O` 和 `1/I`，
//! 口头报码和手工录入不易出错。12 位、32 字符字母表约有
//! 1.2e18 个组合，随机碰撞靠唯一索引在写入时兜底。

use rand::Rng;
use sha2::{Digest, Sha256};

/// Unambiguous code alphabet (no 0/O, no 1/I)
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const CODE_GROUPS: usize = 3;
const GROUP_LEN: usize = 4;

/// 生成一个随机票码 `XXXX-XXXX-XXXX`
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(CODE_GROUPS * GROUP_LEN + CODE_GROUPS - 1);
    for group in 0..CODE_GROUPS {
        if group > 0 {
            code.push('-');
        }
        for _ in 0..GROUP_LEN {
            let idx = rng.gen_range(0..CODE_ALPHABET.len());
            code.push(CODE_ALPHABET[idx] as char);
        }
    }
    code
}

/// QR 负载: `MQ1.<ticket_id>.<code>.<issued_at>.<digest>`
///
/// 摘要覆盖前四段，密钥参与散列，改动任何一段都会使校验失败。
pub fn build_qr_payload(ticket_id: &str, code: &str, issued_at: i64, signing_key: &str) -> String {
    let digest = payload_digest(ticket_id, code, issued_at, signing_key);
    format!("MQ1.{}.{}.{}.{}", ticket_id, code, issued_at, digest)
}

/// 校验 QR 负载的完整性
pub fn verify_qr_payload(payload: &str, signing_key: &str) -> bool {
    let parts: Vec<&str> = payload.split('.').collect();
    if parts.len() != 5 || parts[0] != "MQ1" {
        return false;
    }
    let Ok(issued_at) = parts[3].parse::<i64>() else {
        return false;
    };
    let expected = payload_digest(parts[1], parts[2], issued_at, signing_key);
    // 摘要比较；负载本身不是秘密，无需常数时间比较
    expected == parts[4]
}

fn payload_digest(ticket_id: &str, code: &str, issued_at: i64, signing_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signing_key.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(ticket_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(code.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(issued_at.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_format() {
        let code = generate_code();
        assert_eq!(code.len(), 14);
        let groups: Vec<&str> = code.split('-').collect();
        assert_eq!(groups.len(), 3);
        for group in groups {
            assert_eq!(group.len(), 4);
            for c in group.bytes() {
                assert!(CODE_ALPHABET.contains(&c), "ambiguous char in {code}");
            }
        }
    }

    #[test]
    fn test_code_excludes_ambiguous_chars() {
        for _ in 0..200 {
            let code = generate_code();
            for banned in ['0', 'O', '1', 'I'] {
                assert!(!code.contains(banned));
            }
        }
    }

    #[test]
    fn test_qr_payload_roundtrip() {
        let payload = build_qr_payload("tk-1", "ABCD-EFGH-JKLM", 1_700_000_000_000, "key");
        assert!(verify_qr_payload(&payload, "key"));
    }

    #[test]
    fn test_qr_payload_rejects_tampering() {
        let payload = build_qr_payload("tk-1", "ABCD-EFGH-JKLM", 1_700_000_000_000, "key");
        let tampered = payload.replace("ABCD", "ZZZZ");
        assert!(!verify_qr_payload(&tampered, "key"));
    }

    #[test]
    fn test_qr_payload_rejects_wrong_key() {
        let payload = build_qr_payload("tk-1", "ABCD-EFGH-JKLM", 1_700_000_000_000, "key");
        assert!(!verify_qr_payload(&payload, "other-key"));
    }

    #[test]
    fn test_qr_payload_rejects_malformed() {
        assert!(!verify_qr_payload("", "key"));
        assert!(!verify_qr_payload("MQ1.only.three", "key"));
        assert!(!verify_qr_payload("XX9.a.b.123.deadbeef", "key"));
    }
}
