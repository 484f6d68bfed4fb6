/// Returns a fresh 16-character hex id for tagging a proof run.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes)
}
