//! Prints a random secret suitable for `JWT_SECRET`.

use rand::RngCore;

const SECRET_BYTES: usize = 32;

fn main() {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    println!("{}", hex::encode(bytes));
}
