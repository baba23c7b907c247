#![cfg(test)]

use crate::{demangle, Error, Symbol};

macro_rules! eq {
    ($mangled:literal => $demangled:literal) => {
        match demangle($mangled) {
            Ok(out) => assert_eq!(out, $demangled, "demangling '{}'", $mangled),
            Err(err) => panic!("Formatting '{}' failed: {}.", $mangled, err),
        }
    };
}

macro_rules! fails {
    ($mangled:literal) => {
        assert!(
            demangle($mangled).is_err(),
            "expected '{}' to be rejected, got {:?}",
            $mangled,
            demangle($mangled)
        )
    };
}

#[test]
fn simple() {
    eq!("_Z3foov" => "foo()");
    eq!("_ZN3foo3barEi" => "foo::bar(int)");
    eq!("_ZN5space3fooEibc" => "space::foo(int, bool, char)");
    eq!("_ZN3fooE" => "foo");
    eq!("_ZSt4cout" => "std::cout");
    eq!("_ZNSt3one3twoE" => "std::one::two");
    eq!("_ZN12_GLOBAL__N_11fEv" => "(anonymous namespace)::f()");
}

#[test]
fn alternate_prefixes() {
    eq!("__Z3foov" => "foo()");
    eq!("___Z3foov_block_invoke" => "invocation function for block in foo()");
    eq!("____Z3foov_block_invoke_2" => "invocation function for block in foo()");
    eq!("___Z3foov_block_invoke4" => "invocation function for block in foo()");
}

#[test]
fn dot_suffixes() {
    eq!("_Z3foov.cold" => "foo() (.cold)");
    eq!("_Z3foov.clone.2" => "foo() (.clone.2)");
}

#[test]
fn bare_types() {
    eq!("i" => "int");
    eq!("PKc" => "char const*");
    eq!("A5_i" => "int [5]");
    eq!("DB32_" => "_BitInt(32)");
}

#[test]
fn builtin_types() {
    eq!("_Z1fv" => "f()");
    eq!("_Z1fwbca" => "f(wchar_t, bool, char, signed char)");
    eq!("_Z1fhst" => "f(unsigned char, short, unsigned short)");
    eq!("_Z1fijlm" => "f(int, unsigned int, long, unsigned long)");
    eq!("_Z1fxyno" => "f(long long, unsigned long long, __int128, unsigned __int128)");
    eq!("_Z1fiz" => "f(int, ...)");
    eq!("_Z1fDn" => "f(std::nullptr_t)");
    eq!("_Z1fDa" => "f(auto)");
    eq!("_Z1fDc" => "f(decltype(auto))");
    eq!("_Z1fDiDsDu" => "f(char32_t, char16_t, char8_t)");
    eq!("_Z1fu6custom" => "f(custom)");
}

#[test]
fn declarator_composition() {
    eq!("_Z1fPKc" => "f(char const*)");
    eq!("_Z1fRKi" => "f(int const&)");
    eq!("_Z1fVi" => "f(int volatile)");
    eq!("_Z1fPrVKi" => "f(int const volatile restrict*)");
    eq!("_Z1fA5_i" => "f(int [5])");
    eq!("_Z1fPA5_i" => "f(int (*) [5])");
    eq!("_Z1fA5_A3_i" => "f(int [5][3])");
    eq!("_Z1fRA5_i" => "f(int (&) [5])");
    eq!("_Z1fPFvvE" => "f(void (*)())");
    eq!("_Z1fPFivE" => "f(int (*)())");
    eq!("_Z1fPFviE" => "f(void (*)(int))");
    eq!("_Z1fPFPivE" => "f(int* (*)())");
    eq!("_Z1fM1Xi" => "f(int X::*)");
    eq!("_Z1fM1XFvvE" => "f(void (X::*)())");
    eq!("_Z1fM1XKFvvE" => "f(void (X::*)() const)");
    eq!("_Z1fM1XFvvRE" => "f(void (X::*)() &)");
    eq!("_Z1fPDoFvvE" => "f(void (*)() noexcept)");
}

#[test]
fn reference_collapsing() {
    eq!("_Z1fRi" => "f(int&)");
    eq!("_Z1fOi" => "f(int&&)");
    eq!("_Z1fRRi" => "f(int&)");
    eq!("_Z1fROi" => "f(int&)");
    eq!("_Z1fORi" => "f(int&)");
    eq!("_Z1fOOi" => "f(int&&)");
}

#[test]
fn substitutions() {
    eq!("_ZplR1XS0_" => "operator+(X&, X&)");
    eq!("_Z1fPKcS0_" => "f(char const*, char const*)");
    // Expanding the back-reference changes nothing about the output.
    eq!("_Z1fPKcPKc" => "f(char const*, char const*)");
    eq!("_ZN1a1bEPNS_1cE" => "a::b(a::c*)");
}

#[test]
fn special_substitutions() {
    eq!("_Z1fSs" => "f(std::string)");
    eq!("_Z1fRKSs" => "f(std::string const&)");
    eq!("_Z1fSa" => "f(std::allocator)");
    eq!("_Z1fSb" => "f(std::basic_string)");
    eq!("_Z1fSi" => "f(std::istream)");
    eq!("_Z1fSo" => "f(std::ostream)");
    eq!("_Z1fSd" => "f(std::iostream)");
    eq!("_ZNSs4sizeEv" => "std::string::size()");
    eq!("_ZNSsC1Ev" =>
        "std::basic_string<char, std::char_traits<char>, std::allocator<char>>::basic_string()");
}

#[test]
fn std_containers() {
    eq!("_ZNSt6vectorIiSaIiEE9push_backERKi" =>
        "std::vector<int, std::allocator<int>>::push_back(int const&)");
    eq!("_ZNSt3__16vectorIiNS_9allocatorIiEEE9push_backEOi" =>
        "std::__1::vector<int, std::__1::allocator<int>>::push_back(int&&)");
    eq!("_ZSt4swapIiEvRT_S1_" => "void std::swap<int>(int&, int&)");
    eq!("_Z1fSt6string" => "f(std::string)");
}

#[test]
fn templates() {
    eq!("_ZN3fooIiE3barEv" => "foo<int>::bar()");
    eq!("_Z3maxIiET_S0_S0_" => "int max<int>(int, int)");
    eq!("_Z1fIiEvT_" => "void f<int>(int)");
    eq!("_ZN2ns5thingILi5EEE" => "ns::thing<5>");
}

#[test]
fn template_arg_literals() {
    eq!("_Z1fILi5EEvv" => "void f<5>()");
    eq!("_Z1fILin5EEvv" => "void f<-5>()");
    eq!("_Z1fILb1EEvv" => "void f<true>()");
    eq!("_Z1fILb0EEvv" => "void f<false>()");
    eq!("_Z1fILc97EEvv" => "void f<(char)97>()");
    eq!("_Z1fILj3EEvv" => "void f<3u>()");
    eq!("_Z1fILl3EEvv" => "void f<3l>()");
    eq!("_Z1fILln3EEEvv" => "void f<-3l>()");
    eq!("_Z1fILDnEEvv" => "void f<nullptr>()");
}

#[test]
fn template_arg_expressions() {
    eq!("_Z1aIXplLi1ELi2EEEvv" => "void a<1 + 2>()");
    eq!("_Z1aIXmiLi1ELi2EEEvv" => "void a<1 - 2>()");
    eq!("_Z1aIXquLb1ELi1ELi2EEEvv" => "void a<true ? 1 : 2>()");
    eq!("_Z1fIXadL_Z1gEEEvv" => "void f<&g>()");
    eq!("_Z1fIXclL_Z1gEEEEvv" => "void f<g()>()");
}

#[test]
fn gt_inside_template_args_is_parenthesized() {
    eq!("_Z1aIXgtLi1ELi2EEEvv" => "void a<(1 > 2)>()");
    eq!("_Z1aIXrsLi1ELi2EEEvv" => "void a<(1 >> 2)>()");
    eq!("_Z1aIXgeLi1ELi2EEEvv" => "void a<1 >= 2>()");
    eq!("_Z1aIXltLi1ELi2EEEvv" => "void a<1 < 2>()");
}

#[test]
fn parameter_packs() {
    eq!("_ZN3foo3barIJiEEEvDpT_" => "void foo::bar<int>(int)");
    eq!("_Z1fIJEEvDpT_" => "void f<>()");
    eq!("_Z1fIJiEEvDpT_" => "void f<int>(int)");
    eq!("_Z1fIJicEEvDpT_" => "void f<int, char>(int, char)");
    eq!("_Z1fIJPiPcEEvDpT_" => "void f<int*, char*>(int*, char*)");
}

#[test]
fn sizeof_pack() {
    eq!("_Z1fIJicEEvDTsZT_E" => "void f<int, char>(decltype(sizeof...(int, char)))");
    eq!("_Z1fIJicEEvDTszspT_E" => "void f<int, char>(decltype(sizeof (int, char)))");
}

#[test]
fn fold_expressions() {
    eq!("_Z1fIJicEEvDTflplT_E" => "void f<int, char>(decltype((... + (int, char))))");
}

#[test]
fn ctors_and_dtors() {
    eq!("_ZN1XC1Ev" => "X::X()");
    eq!("_ZN1XC2Ev" => "X::X()");
    eq!("_ZN1XC3Ev" => "X::X()");
    eq!("_ZN1XD0Ev" => "X::~X()");
    eq!("_ZN1XD1Ev" => "X::~X()");
    eq!("_ZN1XD2Ev" => "X::~X()");
    eq!("_ZN1XC1ERKS_" => "X::X(X const&)");
    eq!("_ZN1XCI11BEv" => "X::X()");
}

#[test]
fn conversion_operators() {
    eq!("_ZN1XcviEv" => "X::operator int()");
    eq!("_ZN1XcvbEv" => "X::operator bool()");
    eq!("_ZN1XcvPKcEv" => "X::operator char const*()");
    eq!("_ZN1XcvT_IiEEv" => "X::operator int<int>()");
    eq!("_ZN1XcvPT_IiEEv" => "X::operator int*<int>()");
}

#[test]
fn operator_names() {
    eq!("_ZN1XplERKS_" => "X::operator+(X const&)");
    eq!("_ZN1XixEi" => "X::operator[](int)");
    eq!("_ZN1XclEv" => "X::operator()()");
    eq!("_ZN1XssERKS_" => "X::operator<=>(X const&)");
    eq!("_ZN1XawEv" => "X::operator co_await()");
    eq!("_ZnwmPv" => "operator new(unsigned long, void*)");
    eq!("_ZdlPv" => "operator delete(void*)");
    eq!("_Zli2_wy" => "operator\"\" _w(unsigned long long)");
}

#[test]
fn function_qualifiers() {
    eq!("_ZNK1X1fEv" => "X::f() const");
    eq!("_ZNVK1X1fEv" => "X::f() const volatile");
    eq!("_ZNR1X1fEv" => "X::f() &");
    eq!("_ZNO1X1fEv" => "X::f() &&");
}

#[test]
fn local_names() {
    eq!("_ZZ3foovE1x" => "foo()::x");
    eq!("_ZZ3foovE1x_0" => "foo()::x");
    eq!("_ZZ3foovEs" => "foo()::string literal");
    eq!("_ZZ3foovEs_1" => "foo()::string literal");
    eq!("_ZZN1A1fEvE1x" => "A::f()::x");
    eq!("_ZZ3foovEN1C1mEv" => "foo()::C::m()");
}

#[test]
fn special_names() {
    eq!("_ZTV1X" => "vtable for X");
    eq!("_ZTT1X" => "VTT for X");
    eq!("_ZTI1X" => "typeinfo for X");
    eq!("_ZTS1X" => "typeinfo name for X");
    eq!("_ZTIPKc" => "typeinfo for char const*");
    eq!("_ZTVN10__cxxabiv117__class_type_infoE" =>
        "vtable for __cxxabiv1::__class_type_info");
    eq!("_ZGVZ3foovE1x" => "guard variable for foo()::x");
    eq!("_ZThn16_N1X1fEv" => "non-virtual thunk to X::f()");
    eq!("_ZTv0_n24_N1X1fEv" => "virtual thunk to X::f()");
    eq!("_ZTch0_h0_N1X1fEv" => "covariant return thunk to X::f()");
    eq!("_ZTW1x" => "thread-local wrapper routine for x");
    eq!("_ZTH1x" => "thread-local initialization routine for x");
    eq!("_ZGR1a_" => "reference temporary for a");
    eq!("_ZGR1a0_" => "reference temporary for a");
    eq!("_ZTAXLi5EE" => "template parameter object for 5");
    eq!("_ZTC1B0_1A" => "construction vtable for A-in-B");
    eq!("_ZGIW3foo" => "initializer for module foo");
}

#[test]
fn module_entities() {
    eq!("_ZW3foo3barv" => "bar@foo()");
}

#[test]
fn structured_bindings() {
    eq!("_ZDC1a1bE" => "[a, b]");
}

#[test]
fn lambdas_and_unnamed_types() {
    eq!("_ZZ4mainENKUlvE_clEv" => "main::'lambda'()::operator()() const");
    eq!("_ZZ4mainENKUliE_clEi" => "main::'lambda'(int)::operator()(int) const");
    eq!("_ZZ4mainENKUlvE0_clEv" => "main::'lambda0'()::operator()() const");
    eq!("_ZTIN1XUt_E" => "typeinfo for X::'unnamed'");
    eq!("_ZTIN1XUt0_E" => "typeinfo for X::'unnamed0'");
    eq!("_ZN1XUb_E" => "X::'block-literal'");
}

#[test]
fn generic_lambda_auto_recovery() {
    eq!("_ZZ4mainENKUlT_E_clIiEEDaT_" =>
        "auto main::'lambda'(auto)::operator()<int>(int) const");
}

#[test]
fn abi_tags() {
    eq!("_Z1fB5cxx11v" => "f[abi:cxx11]()");
}

#[test]
fn enable_if_attributes() {
    eq!("_Z1fUa9enable_ifIXgeLi1ELi2EEEv" => "f() [enable_if:1 >= 2]");
}

#[test]
fn objc_and_vendor_qualifiers() {
    eq!("_Z1fPU11objcproto1A11objc_object" => "f(id<A>)");
    eq!("_Z1fPU11objcproto1A8NSObject" => "f(NSObject<A>*)");
    eq!("_Z1fPU5AS256i" => "f(int AS256*)");
}

#[test]
fn vector_types() {
    eq!("_Z1fDv4_i" => "f(int vector[4])");
    eq!("_Z1fDv4_p" => "f(pixel vector[4])");
}

#[test]
fn bit_int_types() {
    eq!("_Z1fDB32_" => "f(_BitInt(32))");
    eq!("_Z1fDU8_" => "f(unsigned _BitInt(8))");
}

#[test]
fn elaborated_type_specifiers() {
    eq!("_Z1fTs3foo" => "f(struct foo)");
    eq!("_Z1fTu3foo" => "f(union foo)");
    eq!("_Z1fTe3foo" => "f(enum foo)");
}

#[test]
fn decltype_expressions() {
    eq!("_Z1fDTplfp_fp0_E" => "f(decltype(fp + fp0))");
}

#[test]
fn malformed_inputs_are_rejected() {
    fails!("");
    fails!("_Z");
    fails!("_Z1");
    fails!("_Z3fo");
    fails!("_Z3foovX");
    fails!("_ZSt");
    fails!("_Z1fS0_");
    fails!("_Z1fT_");
    fails!("_Z1fIiEvT0_");
    fails!("_Zcv");
    fails!("_Z1fA_");
    fails!("not a symbol");
    // Floating-point builtins are not part of the recognized grammar.
    fails!("_Z1ff");
}

#[test]
fn unconsumed_input_is_rejected() {
    fails!("_Z3foovx");
    fails!("iPc");
}

#[test]
fn deep_recursion_is_bounded() {
    let mut input = String::from("_Z1f");
    for _ in 0..512 {
        input.push('P');
    }
    input.push('i');
    assert_eq!(demangle(&input), Err(Error::TooMuchRecursion));

    // A moderate chain is fine.
    let mut input = String::from("_Z1f");
    for _ in 0..16 {
        input.push('P');
    }
    input.push('i');
    assert!(demangle(&input).is_ok());
}

#[test]
fn nested_name_chains_do_not_blow_the_printer() {
    // Iteratively-built prefixes make the AST deep without recursive
    // parsing; printing must stay bounded.
    let mut input = String::from("_ZN");
    for _ in 0..5_000 {
        input.push_str("1a");
    }
    input.push('E');
    let _ = demangle(&input);
}

#[test]
fn partial_api_on_a_plain_function() {
    let sym = Symbol::new("_ZN5space3fooEibc").unwrap();
    assert!(sym.is_function());
    assert!(!sym.is_special_name());
    assert!(!sym.is_data());
    assert!(!sym.is_ctor_or_dtor());
    assert!(!sym.has_function_qualifiers());
    assert_eq!(sym.mangled(), "_ZN5space3fooEibc");
    assert_eq!(sym.function_base_name().unwrap(), "foo");
    assert_eq!(sym.function_decl_context_name().unwrap(), "space");
    assert_eq!(sym.function_name().unwrap(), "space::foo");
    assert_eq!(sym.function_parameters().unwrap(), "(int, bool, char)");
    assert_eq!(sym.function_return_type().unwrap(), "");
}

#[test]
fn partial_api_on_a_template_function() {
    let sym = Symbol::new("_Z3maxIiET_S0_S0_").unwrap();
    assert_eq!(sym.function_base_name().unwrap(), "max");
    assert_eq!(sym.function_decl_context_name().unwrap(), "");
    assert_eq!(sym.function_name().unwrap(), "max<int>");
    assert_eq!(sym.function_parameters().unwrap(), "(int, int)");
    assert_eq!(sym.function_return_type().unwrap(), "int");
}

#[test]
fn partial_api_on_a_local_function() {
    let sym = Symbol::new("_ZZ3foovEN1C1mEv").unwrap();
    assert!(sym.is_function());
    assert_eq!(sym.function_base_name().unwrap(), "m");
    assert_eq!(sym.function_decl_context_name().unwrap(), "foo()::C");
}

#[test]
fn partial_api_on_non_functions() {
    let vtable = Symbol::new("_ZTV1X").unwrap();
    assert!(vtable.is_special_name());
    assert!(!vtable.is_function());
    assert!(vtable.function_base_name().is_none());

    let data = Symbol::new("_ZSt4cout").unwrap();
    assert!(data.is_data());
    assert!(data.function_parameters().is_none());
}

#[test]
fn partial_api_predicates() {
    assert!(Symbol::new("_ZN1XC1Ev").unwrap().is_ctor_or_dtor());
    assert!(Symbol::new("_ZN1XD0Ev").unwrap().is_ctor_or_dtor());
    assert!(!Symbol::new("_Z3foov").unwrap().is_ctor_or_dtor());
    assert!(Symbol::new("_ZNK1X1fEv").unwrap().has_function_qualifiers());
    assert!(Symbol::new("_ZNO1X1fEv").unwrap().has_function_qualifiers());
    assert!(!Symbol::new("_Z3foov").unwrap().has_function_qualifiers());
}

#[test]
fn display_matches_demangle() {
    let sym = Symbol::new("_ZN3foo3barEi").unwrap();
    assert_eq!(sym.to_string(), sym.demangle());
}
