fn main() {
  cfg_aliases::cfg_aliases! {
      posix: { unix },
      win32: { windows },
      apple: { target_vendor = "apple" }
  }
}
